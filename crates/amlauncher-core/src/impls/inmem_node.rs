//! InMemoryNodeManager - 開発用・テスト用の node agent
//!
//! # 学習ポイント
//! - tokio::sync::Mutex による状態管理（ロックを跨いで await しない）
//! - 呼び出しログの記録（テストでの順序検証用）
//! - スクリプト化された障害注入

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{APPLICATION_ATTEMPT_ID_ENV, ContainerId, RemoteError};
use crate::ports::{
    ContainerManager, ContainerState, ContainerStatus, StartContainerRequest,
    StopContainerRequest,
};

/// One observed call, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallRecord {
    StartInvoked {
        container: ContainerId,
        attempt_env: Option<String>,
    },
    StartReturned {
        container: ContainerId,
        ok: bool,
    },
    StopInvoked {
        container: ContainerId,
    },
    StopReturned {
        container: ContainerId,
        ok: bool,
    },
}

#[derive(Debug, Default)]
struct NodeState {
    containers: HashMap<ContainerId, ContainerStatus>,
    calls: Vec<CallRecord>,
    start_faults: VecDeque<RemoteError>,
    stop_faults: VecDeque<RemoteError>,
    start_delay: Duration,
}

/// InMemoryNodeManager は node agent の代わり
///
/// - start: 成功すると container を Running として記録
/// - stop: 未知の container には `ContainerNotFound`
/// - 障害は `fail_next_*` で積んだ順に 1 回ずつ返す
#[derive(Debug, Default)]
pub struct InMemoryNodeManager {
    state: Mutex<NodeState>,
}

impl InMemoryNodeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue faults returned by the next `start_container` calls.
    pub async fn fail_next_starts(&self, faults: impl IntoIterator<Item = RemoteError>) {
        self.state.lock().await.start_faults.extend(faults);
    }

    /// Queue faults returned by the next `stop_container` calls.
    pub async fn fail_next_stops(&self, faults: impl IntoIterator<Item = RemoteError>) {
        self.state.lock().await.stop_faults.extend(faults);
    }

    /// Delay applied to every `start_container` before it answers.
    pub async fn set_start_delay(&self, delay: Duration) {
        self.state.lock().await.start_delay = delay;
    }

    pub async fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().await.calls.clone()
    }

    pub async fn start_calls(&self) -> usize {
        self.count(|c| matches!(c, CallRecord::StartInvoked { .. }))
            .await
    }

    pub async fn stop_calls(&self) -> usize {
        self.count(|c| matches!(c, CallRecord::StopInvoked { .. }))
            .await
    }

    /// Identity env value seen by each `start_container`, in call order.
    pub async fn start_envs(&self) -> Vec<Option<String>> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|c| match c {
                CallRecord::StartInvoked { attempt_env, .. } => Some(attempt_env.clone()),
                _ => None,
            })
            .collect()
    }

    async fn count(&self, pred: impl Fn(&CallRecord) -> bool) -> usize {
        self.state.lock().await.calls.iter().filter(|c| pred(c)).count()
    }
}

#[async_trait]
impl ContainerManager for InMemoryNodeManager {
    async fn start_container(&self, request: StartContainerRequest) -> Result<(), RemoteError> {
        let container = request.context.container;
        let (fault, delay) = {
            let mut state = self.state.lock().await;
            state.calls.push(CallRecord::StartInvoked {
                container,
                attempt_env: request
                    .context
                    .environment
                    .get(APPLICATION_ATTEMPT_ID_ENV)
                    .cloned(),
            });
            (state.start_faults.pop_front(), state.start_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        let result = match fault {
            Some(err) => Err(err),
            None => {
                state.containers.insert(
                    container,
                    ContainerStatus {
                        container,
                        state: ContainerState::Running,
                        exit_status: None,
                        diagnostics: String::new(),
                    },
                );
                Ok(())
            }
        };
        state.calls.push(CallRecord::StartReturned {
            container,
            ok: result.is_ok(),
        });
        result
    }

    async fn stop_container(&self, request: StopContainerRequest) -> Result<(), RemoteError> {
        let container = request.container;
        let mut state = self.state.lock().await;
        state.calls.push(CallRecord::StopInvoked { container });

        let result = match state.stop_faults.pop_front() {
            Some(err) => Err(err),
            None => match state.containers.get_mut(&container) {
                Some(status) => {
                    status.state = ContainerState::Complete;
                    status.exit_status = Some(0);
                    status.diagnostics = "stopped by launcher".into();
                    Ok(())
                }
                None => Err(RemoteError::ContainerNotFound(container)),
            },
        };
        state.calls.push(CallRecord::StopReturned {
            container,
            ok: result.is_ok(),
        });
        result
    }

    async fn get_container_status(
        &self,
        container: ContainerId,
    ) -> Result<ContainerStatus, RemoteError> {
        self.state
            .lock()
            .await
            .containers
            .get(&container)
            .cloned()
            .ok_or(RemoteError::ContainerNotFound(container))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ApplicationId, Credentials, LaunchContext, Resource, SecurityToken,
    };
    use std::collections::BTreeMap;

    fn context(container: ContainerId) -> LaunchContext {
        let mut environment = BTreeMap::new();
        environment.insert(APPLICATION_ATTEMPT_ID_ENV.to_string(), "appattempt_1_0001_000001".to_string());
        let token = SecurityToken::new("T", "s", vec![1]);
        LaunchContext {
            container,
            commands: vec!["am".into()],
            environment,
            credentials: Credentials {
                application_token: token.clone(),
                client_token: token,
            },
            resource: Resource::new(1, 1),
        }
    }

    fn container() -> ContainerId {
        ContainerId::new(ApplicationId::new(1, 1), 1, 1)
    }

    #[tokio::test]
    async fn start_then_stop_completes_container() {
        let node = InMemoryNodeManager::new();
        let c = container();

        node.start_container(StartContainerRequest { context: context(c) })
            .await
            .unwrap();
        assert_eq!(
            node.get_container_status(c).await.unwrap().state,
            ContainerState::Running
        );

        node.stop_container(StopContainerRequest { container: c })
            .await
            .unwrap();
        let status = node.get_container_status(c).await.unwrap();
        assert_eq!(status.state, ContainerState::Complete);
        assert_eq!(status.exit_status, Some(0));
        assert_eq!(node.calls().await.len(), 4);
        assert_eq!(
            node.start_envs().await,
            vec![Some("appattempt_1_0001_000001".to_string())]
        );
    }

    #[tokio::test]
    async fn stop_unknown_container_is_not_found() {
        let node = InMemoryNodeManager::new();
        let err = node
            .stop_container(StopContainerRequest {
                container: container(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::ContainerNotFound(_)));
    }

    #[tokio::test]
    async fn faults_are_consumed_in_order() {
        let node = InMemoryNodeManager::new();
        node.fail_next_starts(vec![RemoteError::Rejected("first".into())])
            .await;

        let first = node
            .start_container(StartContainerRequest {
                context: context(container()),
            })
            .await;
        let second = node
            .start_container(StartContainerRequest {
                context: context(container()),
            })
            .await;

        assert_eq!(first, Err(RemoteError::Rejected("first".into())));
        assert_eq!(second, Ok(()));
        assert_eq!(node.start_calls().await, 2);
        assert!(node.get_container_status(container()).await.is_ok());
    }
}
