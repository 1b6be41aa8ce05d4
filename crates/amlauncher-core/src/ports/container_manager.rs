//! ContainerManager - node agent のコンテナ管理プロトコル
//!
//! 背後の transport（RPC client, connection cache）は関知しない。
//! 実装は下記の呼び出し契約だけを守ればよい。

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ContainerId, LaunchContext, RemoteError};

#[derive(Debug, Clone, PartialEq)]
pub struct StartContainerRequest {
    pub context: LaunchContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopContainerRequest {
    pub container: ContainerId,
}

/// Container state as reported by the node agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    New,
    Running,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub container: ContainerId,
    pub state: ContainerState,
    pub exit_status: Option<i32>,
    pub diagnostics: String,
}

/// Remote container-management endpoint of one node agent.
///
/// # Contract
/// - `start_container`: ack or error. A `RemoteError::Rejected` is an explicit
///   refusal; timeouts and refused connections are transient.
/// - `stop_container`: must be safe on unknown or already stopped containers;
///   those may answer `RemoteError::ContainerNotFound`.
/// - `get_container_status`: not used on the launch/cleanup path.
#[async_trait]
pub trait ContainerManager: Send + Sync {
    async fn start_container(&self, request: StartContainerRequest) -> Result<(), RemoteError>;

    async fn stop_container(&self, request: StopContainerRequest) -> Result<(), RemoteError>;

    async fn get_container_status(
        &self,
        container: ContainerId,
    ) -> Result<ContainerStatus, RemoteError>;
}

impl fmt::Debug for dyn ContainerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn ContainerManager")
    }
}
