//! StaticEndpointResolver - node → endpoint の固定テーブル

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{AttemptIdentity, LauncherError, NodeId};
use crate::ports::{ContainerEndpointResolver, ContainerManager};

/// StaticEndpointResolver は起動前に埋めたテーブルから endpoint を返す
#[derive(Debug, Default)]
pub struct StaticEndpointResolver {
    endpoints: HashMap<NodeId, Arc<dyn ContainerManager>>,
}

impl StaticEndpointResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node: NodeId, endpoint: Arc<dyn ContainerManager>) {
        self.endpoints.insert(node, endpoint);
    }

    pub fn with(mut self, node: NodeId, endpoint: Arc<dyn ContainerManager>) -> Self {
        self.register(node, endpoint);
        self
    }
}

#[async_trait]
impl ContainerEndpointResolver for StaticEndpointResolver {
    async fn resolve(
        &self,
        attempt: AttemptIdentity,
        node: &NodeId,
    ) -> Result<Arc<dyn ContainerManager>, LauncherError> {
        self.endpoints
            .get(node)
            .cloned()
            .ok_or_else(|| LauncherError::EndpointUnavailable {
                node: node.to_string(),
                reason: format!("no endpoint registered (attempt {attempt})"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ApplicationId;
    use crate::impls::InMemoryNodeManager;

    #[tokio::test]
    async fn registered_node_resolves() {
        let node = NodeId::new("h1", 1234);
        let resolver = StaticEndpointResolver::new()
            .with(node.clone(), Arc::new(InMemoryNodeManager::new()));
        let attempt = AttemptIdentity::new(ApplicationId::new(1, 1), 1);

        assert!(resolver.resolve(attempt, &node).await.is_ok());
        let err = resolver
            .resolve(attempt, &NodeId::new("h2", 1234))
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::EndpointUnavailable { node, .. } if node == "h2:1234"));
    }
}
