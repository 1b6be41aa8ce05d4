//! ContainerEndpointResolver - AM をホストする node agent の解決

use std::sync::Arc;

use async_trait::async_trait;

use super::container_manager::ContainerManager;
use crate::domain::{AttemptIdentity, LauncherError, NodeId};

/// Resolves the container-management endpoint for an attempt's AM node.
///
/// # Errors
/// `LauncherError::EndpointUnavailable` when the node or allocation cannot be
/// reached. The launcher makes no further assumption about how endpoints are
/// built or cached.
#[async_trait]
pub trait ContainerEndpointResolver: Send + Sync {
    async fn resolve(
        &self,
        attempt: AttemptIdentity,
        node: &NodeId,
    ) -> Result<Arc<dyn ContainerManager>, LauncherError>;
}
