//! Domain - ドメインモデル（ids, allocation, context, events, errors）

pub mod allocation;
pub mod context;
pub mod errors;
pub mod events;
pub mod ids;

pub use allocation::{AmAllocation, AppAttempt, Resource};
pub use context::{
    AM_CONTAINER_ID_ENV, APP_SUBMIT_TIME_ENV, APPLICATION_ATTEMPT_ID_ENV,
    APPLICATION_CLIENT_SECRET_ENV, Credentials, LaunchContext, NM_HOST_ENV, NM_PORT_ENV,
    SecurityToken,
};
pub use errors::{ErrorKind, FailureKind, LauncherError, RemoteError};
pub use events::{LauncherEvent, LauncherEventKind, OutcomeEvent};
pub use ids::{ApplicationId, AttemptIdentity, ContainerId, NodeId};
