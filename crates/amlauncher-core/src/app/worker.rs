//! LaunchWorker - 1 イベント分の LAUNCH / CLEANUP を実行
//!
//! # フロー
//! 1. Resolving: node agent の endpoint を解決
//! 2. Building（LAUNCH のみ）: token 取得と launch context の組み立て
//! 3. Calling: start / stop を呼ぶ。transient な失敗は budget 内で再試行
//! 4. Succeeded / Failed を `TaskReport` として返す
//!
//! # キャンセル
//! shutdown のキャンセルは Calling に入る前だけ見る。
//! node agent を呼び始めた task は retry budget を使い切るまで走る。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::context_builder::LaunchContextBuilder;
use super::retry::RetryPolicy;
use crate::config::LauncherConfig;
use crate::domain::{
    AttemptIdentity, ContainerId, LaunchContext, LauncherError, LauncherEvent,
    LauncherEventKind, OutcomeEvent, RemoteError,
};
use crate::ports::{
    ContainerEndpointResolver, ContainerManager, StartContainerRequest, StopContainerRequest,
    TokenIssuer,
};

/// Per-task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Pending,
    Resolving,
    Building,
    Calling,
    Succeeded,
    Failed,
}

/// What the launcher remembers about an attempt between tasks.
#[derive(Debug, Clone)]
pub enum LaunchHistory {
    /// Launch succeeded on this endpoint; CLEANUP reuses it without resolving.
    Launched {
        endpoint: Arc<dyn ContainerManager>,
        container: ContainerId,
    },
    /// Launch reached the node agent but did not succeed. The container may
    /// be half started, so CLEANUP resolves again and issues a stop.
    Attempted,
}

/// Everything a task needs besides its shared dependencies.
#[derive(Debug, Clone)]
pub struct TaskInput {
    pub event: LauncherEvent,
    pub history: Option<LaunchHistory>,
}

#[derive(Debug, Clone)]
pub enum TaskResult {
    Launched {
        endpoint: Arc<dyn ContainerManager>,
        container: ContainerId,
    },
    LaunchFailed {
        error: LauncherError,
        /// Whether any `start_container` call was issued.
        reached_remote: bool,
    },
    CleanedUp,
    Cancelled,
}

/// Final report of one task, consumed by the dispatcher.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub attempt: AttemptIdentity,
    pub kind: LauncherEventKind,
    pub result: TaskResult,
}

impl TaskReport {
    pub fn cancelled(attempt: AttemptIdentity, kind: LauncherEventKind) -> Self {
        Self {
            attempt,
            kind,
            result: TaskResult::Cancelled,
        }
    }

    /// Report for a task that died without returning (panic or abort).
    ///
    /// LAUNCH is failed as a rejection and marked as having reached the node
    /// agent, so a following CLEANUP still resolves and stops. CLEANUP is
    /// reported cleaned up like every other cleanup failure.
    pub fn aborted(attempt: AttemptIdentity, kind: LauncherEventKind, reason: &str) -> Self {
        let result = match kind {
            LauncherEventKind::Launch => TaskResult::LaunchFailed {
                error: LauncherError::LaunchRejected(format!("launch task aborted: {reason}")),
                reached_remote: true,
            },
            LauncherEventKind::Cleanup => TaskResult::CleanedUp,
        };
        Self {
            attempt,
            kind,
            result,
        }
    }

    /// Event posted back to the attempt state machine.
    pub fn outcome(&self) -> OutcomeEvent {
        let attempt = self.attempt;
        match &self.result {
            TaskResult::Launched { .. } => OutcomeEvent::Launched { attempt },
            TaskResult::LaunchFailed { error, .. } => OutcomeEvent::launch_failed(attempt, error),
            TaskResult::CleanedUp => OutcomeEvent::CleanedUp { attempt },
            TaskResult::Cancelled => OutcomeEvent::Cancelled {
                attempt,
                kind: self.kind,
            },
        }
    }
}

/// Shutdown cancellation as seen by a task.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Sender gone without cancelling: nothing can cancel us anymore.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// A unit of launcher work. The dispatcher runs one per accepted event.
#[async_trait]
pub trait LaunchTask: Send {
    async fn run(self: Box<Self>, cancel: CancelSignal) -> TaskReport;
}

/// Creates the task for an accepted event. Injected into the dispatcher so
/// tests can substitute their own tasks.
pub type TaskFactory = Arc<dyn Fn(TaskInput) -> Box<dyn LaunchTask> + Send + Sync>;

/// Dependencies shared by all workers.
#[derive(Clone)]
pub struct WorkerDeps {
    pub resolver: Arc<dyn ContainerEndpointResolver>,
    pub tokens: Arc<dyn TokenIssuer>,
    pub builder: LaunchContextBuilder,
    pub retry: RetryPolicy,
    pub call_timeout: Duration,
    pub max_launch_attempts: u32,
    pub max_cleanup_attempts: u32,
}

impl WorkerDeps {
    pub fn from_config(
        config: &LauncherConfig,
        resolver: Arc<dyn ContainerEndpointResolver>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            resolver,
            tokens,
            builder: LaunchContextBuilder::new(),
            retry: config.retry_policy(),
            call_timeout: config.call_timeout(),
            max_launch_attempts: config.max_launch_attempts.max(1),
            max_cleanup_attempts: config.max_cleanup_attempts.max(1),
        }
    }

    /// Factory producing `LaunchWorker`s over these dependencies.
    pub fn into_factory(self) -> TaskFactory {
        let deps = Arc::new(self);
        Arc::new(move |input| {
            Box::new(LaunchWorker::new(input, Arc::clone(&deps))) as Box<dyn LaunchTask>
        })
    }
}

/// LaunchWorker はデフォルトの `LaunchTask`（実際の node agent endpoint を呼ぶ）
pub struct LaunchWorker {
    input: TaskInput,
    deps: Arc<WorkerDeps>,
    state: WorkerState,
}

impl LaunchWorker {
    pub fn new(input: TaskInput, deps: Arc<WorkerDeps>) -> Self {
        Self {
            input,
            deps,
            state: WorkerState::Pending,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, next: WorkerState) {
        debug!(from = ?self.state, to = ?next, "worker state");
        self.state = next;
    }

    async fn call<F>(&self, fut: F) -> Result<(), RemoteError>
    where
        F: Future<Output = Result<(), RemoteError>>,
    {
        match tokio::time::timeout(self.deps.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.deps.call_timeout)),
        }
    }

    async fn resolve(
        &mut self,
        cancel: &mut CancelSignal,
    ) -> Option<Result<Arc<dyn ContainerManager>, LauncherError>> {
        self.transition(WorkerState::Resolving);
        let attempt = Arc::clone(self.input.event.attempt());
        let node = &attempt.allocation.node;
        let resolved = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            resolved = self.deps.resolver.resolve(attempt.id, node) => resolved,
        };
        Some(resolved.map_err(|err| match err {
            LauncherError::EndpointUnavailable { .. } => err,
            other => LauncherError::EndpointUnavailable {
                node: node.to_string(),
                reason: other.to_string(),
            },
        }))
    }

    fn build_context(&mut self) -> Result<LaunchContext, LauncherError> {
        self.transition(WorkerState::Building);
        let attempt = self.input.event.attempt();
        let as_config = |err: LauncherError| match err {
            LauncherError::Configuration(_) => err,
            other => LauncherError::Configuration(format!("token issue failed: {other}")),
        };
        let master = self.deps.tokens.application_token(attempt.id).map_err(as_config)?;
        let client = self.deps.tokens.client_token(attempt.id).map_err(as_config)?;
        self.deps
            .builder
            .build(attempt, &attempt.allocation, master, client)
    }

    fn fail_launch(&mut self, error: LauncherError, reached_remote: bool) -> TaskResult {
        self.transition(WorkerState::Failed);
        warn!(%error, "AM launch failed");
        TaskResult::LaunchFailed {
            error,
            reached_remote,
        }
    }

    async fn launch(&mut self, cancel: &mut CancelSignal) -> TaskResult {
        let endpoint = match self.resolve(cancel).await {
            None => return TaskResult::Cancelled,
            Some(Ok(endpoint)) => endpoint,
            Some(Err(err)) => return self.fail_launch(err, false),
        };

        let context = match self.build_context() {
            Ok(context) => context,
            Err(err) => return self.fail_launch(err, false),
        };

        if cancel.is_cancelled() {
            return TaskResult::Cancelled;
        }

        self.transition(WorkerState::Calling);
        let container = context.container;
        let max = self.deps.max_launch_attempts;
        let mut calls = 0;
        loop {
            calls += 1;
            let request = StartContainerRequest {
                context: context.clone(),
            };
            match self.call(endpoint.start_container(request)).await {
                Ok(()) => {
                    self.transition(WorkerState::Succeeded);
                    info!(%container, calls, "AM launched");
                    return TaskResult::Launched {
                        endpoint,
                        container,
                    };
                }
                Err(err) if err.is_transient() && calls < max => {
                    let delay = self.deps.retry.next_delay(calls);
                    warn!(error = %err, calls, max, ?delay, "start_container failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    let error = LauncherError::LaunchTimedOut {
                        attempts: calls,
                        last_error: err.to_string(),
                    };
                    return self.fail_launch(error, true);
                }
                Err(err) => {
                    return self.fail_launch(LauncherError::LaunchRejected(err.to_string()), true);
                }
            }
        }
    }

    async fn cleanup(&mut self, cancel: &mut CancelSignal) -> TaskResult {
        let (endpoint, container) = match self.input.history.clone() {
            None => {
                debug!("no launch history; nothing to stop");
                self.transition(WorkerState::Succeeded);
                return TaskResult::CleanedUp;
            }
            Some(LaunchHistory::Launched {
                endpoint,
                container,
            }) => (endpoint, container),
            Some(LaunchHistory::Attempted) => {
                let container = self.input.event.attempt().allocation.container;
                match self.resolve(cancel).await {
                    None => return TaskResult::Cancelled,
                    Some(Ok(endpoint)) => (endpoint, container),
                    Some(Err(err)) => {
                        warn!(error = %err, "cannot reach node agent for cleanup; reporting cleaned up");
                        self.transition(WorkerState::Succeeded);
                        return TaskResult::CleanedUp;
                    }
                }
            }
        };

        if cancel.is_cancelled() {
            return TaskResult::Cancelled;
        }

        self.transition(WorkerState::Calling);
        let max = self.deps.max_cleanup_attempts;
        let mut calls = 0;
        loop {
            calls += 1;
            let request = StopContainerRequest { container };
            match self.call(endpoint.stop_container(request)).await {
                Ok(()) => {
                    info!(%container, "AM cleaned up");
                    break;
                }
                Err(RemoteError::ContainerNotFound(_)) => {
                    info!(%container, "AM container already gone");
                    break;
                }
                Err(err) if err.is_transient() && calls < max => {
                    let delay = self.deps.retry.next_delay(calls);
                    warn!(error = %err, calls, max, ?delay, "stop_container failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(error = %err, calls, "stop_container failed; reporting cleaned up anyway");
                    break;
                }
            }
        }
        self.transition(WorkerState::Succeeded);
        TaskResult::CleanedUp
    }
}

#[async_trait]
impl LaunchTask for LaunchWorker {
    async fn run(self: Box<Self>, mut cancel: CancelSignal) -> TaskReport {
        let mut worker = *self;
        let attempt = worker.input.event.attempt_id();
        let kind = worker.input.event.kind();
        let result = match kind {
            LauncherEventKind::Launch => worker.launch(&mut cancel).await,
            LauncherEventKind::Cleanup => worker.cleanup(&mut cancel).await,
        };
        TaskReport {
            attempt,
            kind,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AmAllocation, AppAttempt, ApplicationId, ContainerId, FailureKind, NodeId, Resource,
    };
    use crate::impls::{CallRecord, HmacTokenIssuer, InMemoryNodeManager, StaticEndpointResolver};
    use chrono::Utc;
    use rstest::rstest;

    struct Fixture {
        node: Arc<InMemoryNodeManager>,
        deps: Arc<WorkerDeps>,
        attempt: Arc<AppAttempt>,
    }

    fn fixture() -> Fixture {
        let app = ApplicationId::new(1000, 7);
        let node_id = NodeId::new("h1", 1234);
        let node = Arc::new(InMemoryNodeManager::new());
        let mut resolver = StaticEndpointResolver::new();
        resolver.register(node_id.clone(), node.clone());

        let allocation = AmAllocation::new(ContainerId::new(app, 2, 1), node_id, Resource::new(1024, 1))
            .with_command(["bin/am"]);
        let attempt = Arc::new(AppAttempt::new(
            AttemptIdentity::new(app, 2),
            allocation,
            Utc::now(),
        ));

        let deps = WorkerDeps {
            resolver: Arc::new(resolver),
            tokens: Arc::new(HmacTokenIssuer::new(b"master".to_vec(), b"client".to_vec())),
            builder: LaunchContextBuilder::new(),
            retry: RetryPolicy::immediate(),
            call_timeout: Duration::from_millis(200),
            max_launch_attempts: 3,
            max_cleanup_attempts: 2,
        };
        Fixture {
            node,
            deps: Arc::new(deps),
            attempt,
        }
    }

    async fn run(fx: &Fixture, event: LauncherEvent, history: Option<LaunchHistory>) -> TaskReport {
        let worker = LaunchWorker::new(TaskInput { event, history }, Arc::clone(&fx.deps));
        Box::new(worker).run(CancelSignal::never()).await
    }

    fn launch(fx: &Fixture) -> LauncherEvent {
        LauncherEvent::launch(Arc::clone(&fx.attempt), Utc::now())
    }

    fn cleanup(fx: &Fixture) -> LauncherEvent {
        LauncherEvent::cleanup(Arc::clone(&fx.attempt), Utc::now())
    }

    #[tokio::test]
    async fn launch_injects_attempt_identity() {
        let fx = fixture();
        let report = run(&fx, launch(&fx), None).await;

        assert!(matches!(report.result, TaskResult::Launched { .. }));
        assert_eq!(
            report.outcome(),
            OutcomeEvent::Launched {
                attempt: fx.attempt.id
            }
        );
        let starts = fx.node.start_envs().await;
        assert_eq!(starts, vec![Some("appattempt_1000_0007_000002".to_string())]);
    }

    #[tokio::test]
    async fn launch_times_out_after_budget() {
        let fx = fixture();
        let timeout = RemoteError::Timeout(Duration::from_secs(1));
        fx.node
            .fail_next_starts(vec![timeout.clone(), timeout.clone(), timeout])
            .await;

        let report = run(&fx, launch(&fx), None).await;

        assert!(matches!(
            report.result,
            TaskResult::LaunchFailed {
                error: LauncherError::LaunchTimedOut { attempts: 3, .. },
                reached_remote: true,
            }
        ));
        assert_eq!(fx.node.start_calls().await, 3);
    }

    #[tokio::test]
    async fn transient_failure_then_success_launches() {
        let fx = fixture();
        fx.node
            .fail_next_starts(vec![RemoteError::ConnectionRefused("h1:1234".into())])
            .await;

        let report = run(&fx, launch(&fx), None).await;

        assert!(matches!(report.result, TaskResult::Launched { .. }));
        assert_eq!(fx.node.start_calls().await, 2);
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let fx = fixture();
        fx.node
            .fail_next_starts(vec![RemoteError::Rejected("bad token".into())])
            .await;

        let report = run(&fx, launch(&fx), None).await;

        match report.outcome() {
            OutcomeEvent::LaunchFailed { kind, .. } => assert_eq!(kind, FailureKind::LaunchRejected),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(fx.node.start_calls().await, 1);
    }

    #[tokio::test]
    async fn slow_node_agent_counts_as_timeout() {
        let fx = fixture();
        fx.node.set_start_delay(Duration::from_secs(5)).await;

        let deps = WorkerDeps {
            max_launch_attempts: 1,
            call_timeout: Duration::from_millis(20),
            ..(*fx.deps).clone()
        };
        let worker = LaunchWorker::new(
            TaskInput {
                event: launch(&fx),
                history: None,
            },
            Arc::new(deps),
        );
        let report = Box::new(worker).run(CancelSignal::never()).await;

        assert!(matches!(
            report.result,
            TaskResult::LaunchFailed {
                error: LauncherError::LaunchTimedOut { attempts: 1, .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unknown_node_is_endpoint_unavailable() {
        let fx = fixture();
        let deps = WorkerDeps {
            resolver: Arc::new(StaticEndpointResolver::new()),
            ..(*fx.deps).clone()
        };
        let worker = LaunchWorker::new(
            TaskInput {
                event: launch(&fx),
                history: None,
            },
            Arc::new(deps),
        );
        let report = Box::new(worker).run(CancelSignal::never()).await;

        assert!(matches!(
            report.result,
            TaskResult::LaunchFailed {
                error: LauncherError::EndpointUnavailable { .. },
                reached_remote: false,
            }
        ));
        assert_eq!(fx.node.start_calls().await, 0);
    }

    #[tokio::test]
    async fn missing_command_fails_before_calling() {
        let fx = fixture();
        let mut attempt = (*fx.attempt).clone();
        attempt.allocation.command = None;
        let event = LauncherEvent::launch(Arc::new(attempt), Utc::now());

        let report = run(&fx, event, None).await;

        match report.outcome() {
            OutcomeEvent::LaunchFailed { kind, .. } => {
                assert_eq!(kind, FailureKind::ConfigurationError)
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(fx.node.start_calls().await, 0);
    }

    #[tokio::test]
    async fn cleanup_without_history_is_a_noop() {
        let fx = fixture();
        let report = run(&fx, cleanup(&fx), None).await;

        assert!(matches!(report.result, TaskResult::CleanedUp));
        assert!(fx.node.calls().await.is_empty());
    }

    #[rstest]
    #[case::not_found(None)]
    #[case::rejected(Some(RemoteError::Rejected("busy".into())))]
    #[tokio::test]
    async fn cleanup_always_reports_cleaned_up(#[case] fault: Option<RemoteError>) {
        let fx = fixture();
        if let Some(fault) = fault {
            fx.node.fail_next_stops(vec![fault]).await;
        }
        let history = LaunchHistory::Launched {
            endpoint: fx.node.clone(),
            container: fx.attempt.allocation.container,
        };

        // Nothing was started, so the plain case answers ContainerNotFound.
        let report = run(&fx, cleanup(&fx), Some(history)).await;

        assert!(matches!(report.result, TaskResult::CleanedUp));
        assert_eq!(fx.node.stop_calls().await, 1);
    }

    #[tokio::test]
    async fn cleanup_retries_transient_failures_within_budget() {
        let fx = fixture();
        let timeout = RemoteError::Timeout(Duration::from_secs(1));
        fx.node
            .fail_next_stops(vec![timeout.clone(), timeout.clone(), timeout])
            .await;
        let history = LaunchHistory::Launched {
            endpoint: fx.node.clone(),
            container: fx.attempt.allocation.container,
        };

        let report = run(&fx, cleanup(&fx), Some(history)).await;

        assert!(matches!(report.result, TaskResult::CleanedUp));
        assert_eq!(fx.node.stop_calls().await, 2);
    }

    #[tokio::test]
    async fn cleanup_after_attempted_launch_resolves_and_stops() {
        let fx = fixture();
        let report = run(&fx, cleanup(&fx), Some(LaunchHistory::Attempted)).await;

        assert!(matches!(report.result, TaskResult::CleanedUp));
        assert!(matches!(
            fx.node.calls().await.as_slice(),
            [CallRecord::StopInvoked { .. }, CallRecord::StopReturned { .. }]
        ));
    }

    #[tokio::test]
    async fn cancelled_before_calling_never_reaches_node() {
        let fx = fixture();
        let (tx, rx) = watch::channel(true);
        let worker = LaunchWorker::new(
            TaskInput {
                event: launch(&fx),
                history: None,
            },
            Arc::clone(&fx.deps),
        );
        let report = Box::new(worker).run(CancelSignal::new(rx)).await;
        drop(tx);

        assert!(matches!(report.result, TaskResult::Cancelled));
        assert_eq!(fx.node.start_calls().await, 0);
    }
}
