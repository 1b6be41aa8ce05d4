//! LauncherDispatcher - イベント受付と bounded worker pool
//!
//! # 構成
//! - `submit()` は非ブロッキング。unbounded channel に積むだけ
//! - single-writer actor が `InFlightRegistry` を所有し、coalesce / queue / drop を判断
//! - 受理したイベントごとに 1 task を spawn し、Semaphore で同時実行数を制限
//! - 終了した task の `TaskReport` は actor に戻り、`OutcomeEvent` として配送
//! - task が panic しても JoinHandle で検知し、必ず 1 件の outcome を返す
//!
//! # 順序保証
//! - 同じ attempt では、CLEANUP は先行する LAUNCH の報告後にしか始まらない
//! - attempt 間の順序は保証しない

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::registry::{Admission, InFlightRegistry};
use super::status::LauncherCounts;
use super::worker::{CancelSignal, LaunchHistory, TaskFactory, TaskInput, TaskReport};
use crate::domain::{AppAttempt, LauncherError, LauncherEvent, OutcomeEvent};
use crate::ports::Clock;

#[derive(Debug)]
enum Command {
    Submit(LauncherEvent),
    Finished(TaskReport),
    Shutdown,
}

/// LauncherDispatcher は起動中のランチャーへのハンドル
///
/// Dropping the handle without `shutdown()` lets in-flight tasks finish in
/// the background; nothing is cancelled.
pub struct LauncherDispatcher {
    commands: mpsc::UnboundedSender<Command>,
    accepting: AtomicBool,
    clock: Arc<dyn Clock>,
    counts: watch::Receiver<LauncherCounts>,
    cancel_tx: watch::Sender<bool>,
    actor: Mutex<Option<JoinHandle<()>>>,
    shutdown_grace: Duration,
}

/// Everything the dispatcher needs to start; assembled by `LauncherBuilder`.
pub(crate) struct DispatcherParts {
    pub worker_pool_size: usize,
    pub shutdown_grace: Duration,
    pub factory: TaskFactory,
    pub clock: Arc<dyn Clock>,
    pub outcomes: mpsc::UnboundedSender<OutcomeEvent>,
}

impl LauncherDispatcher {
    /// Spawns the actor. Must be called inside a Tokio runtime.
    pub(crate) fn start(parts: DispatcherParts) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (counts_tx, counts) = watch::channel(LauncherCounts::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let actor = Actor {
            commands_rx,
            commands_tx: commands.clone(),
            registry: InFlightRegistry::new(),
            permits: Arc::new(Semaphore::new(parts.worker_pool_size)),
            factory: parts.factory,
            outcomes: parts.outcomes,
            counts_tx,
            counts: LauncherCounts::default(),
            cancel_rx,
            draining: false,
        };
        let handle = tokio::spawn(actor.run());

        info!(
            worker_pool_size = parts.worker_pool_size,
            "launcher dispatcher started"
        );

        Self {
            commands,
            accepting: AtomicBool::new(true),
            clock: parts.clock,
            counts,
            cancel_tx,
            actor: Mutex::new(Some(handle)),
            shutdown_grace: parts.shutdown_grace,
        }
    }

    /// Enqueue an event. Never waits for the work to run.
    ///
    /// # Errors
    /// `LauncherError::ShuttingDown` once `shutdown()` was called.
    pub fn submit(&self, event: LauncherEvent) -> Result<(), LauncherError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(LauncherError::ShuttingDown);
        }
        debug!(attempt = %event.attempt_id(), kind = %event.kind(), "event submitted");
        self.commands
            .send(Command::Submit(event))
            .map_err(|_| LauncherError::ShuttingDown)
    }

    /// Submit a LAUNCH stamped with the dispatcher's clock.
    pub fn launch(&self, attempt: Arc<AppAttempt>) -> Result<(), LauncherError> {
        self.submit(LauncherEvent::launch(attempt, self.clock.now()))
    }

    /// Submit a CLEANUP stamped with the dispatcher's clock.
    pub fn cleanup(&self, attempt: Arc<AppAttempt>) -> Result<(), LauncherError> {
        self.submit(LauncherEvent::cleanup(attempt, self.clock.now()))
    }

    pub fn counts(&self) -> LauncherCounts {
        *self.counts.borrow()
    }

    /// Wait until no task is running or queued.
    pub async fn wait_idle(&self) {
        let mut counts = self.counts.clone();
        // Err only if the actor is gone, which also means idle.
        let _ = counts
            .wait_for(|c| c.in_flight == 0 && c.queued_cleanups == 0)
            .await;
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting, drain for up to the grace period, then cancel tasks
    /// that have not reached the node agent yet. Idempotent.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Shutdown);

        let mut actor = self.actor.lock().await;
        let Some(mut handle) = actor.take() else {
            return;
        };

        info!(grace = ?self.shutdown_grace, "launcher shutting down");
        if tokio::time::timeout(self.shutdown_grace, &mut handle)
            .await
            .is_err()
        {
            let counts = self.counts();
            warn!(
                in_flight = counts.in_flight,
                "shutdown grace elapsed; cancelling pending tasks"
            );
            let _ = self.cancel_tx.send(true);
            if let Err(err) = handle.await {
                warn!(error = %err, "launcher actor ended abnormally");
            }
        }
        info!(counts = ?self.counts(), "launcher stopped");
    }
}

impl Drop for LauncherDispatcher {
    fn drop(&mut self) {
        // Lets the actor exit once idle; the receiver may already be gone.
        let _ = self.commands.send(Command::Shutdown);
    }
}

struct Actor {
    commands_rx: mpsc::UnboundedReceiver<Command>,
    commands_tx: mpsc::UnboundedSender<Command>,
    registry: InFlightRegistry,
    permits: Arc<Semaphore>,
    factory: TaskFactory,
    outcomes: mpsc::UnboundedSender<OutcomeEvent>,
    counts_tx: watch::Sender<LauncherCounts>,
    counts: LauncherCounts,
    cancel_rx: watch::Receiver<bool>,
    draining: bool,
}

impl Actor {
    async fn run(mut self) {
        while let Some(command) = self.commands_rx.recv().await {
            match command {
                Command::Submit(event) => self.on_submit(event),
                Command::Finished(report) => self.on_finished(report),
                Command::Shutdown => self.draining = true,
            }
            self.publish_counts();
            if self.draining && self.registry.is_idle() {
                break;
            }
        }
        debug!("launcher actor exited");
    }

    fn on_submit(&mut self, event: LauncherEvent) {
        let attempt = event.attempt_id();
        let kind = event.kind();
        if self.draining {
            warn!(%attempt, %kind, "event arrived after shutdown; dropped");
            self.counts.dropped += 1;
            return;
        }
        match self.registry.admit(event) {
            Admission::Start(event, history) => self.spawn(event, history),
            Admission::Coalesced => {
                warn!(%attempt, %kind, "duplicate event coalesced into active task");
                self.counts.coalesced += 1;
            }
            Admission::Queued => {
                debug!(%attempt, "CLEANUP queued behind running LAUNCH");
            }
            Admission::Dropped(reason) => {
                warn!(%attempt, %kind, reason, "event dropped");
                self.counts.dropped += 1;
            }
        }
    }

    fn on_finished(&mut self, report: TaskReport) {
        let outcome = report.outcome();
        self.counts.record(&outcome);
        debug!(?outcome, "task finished");
        if self.outcomes.send(outcome).is_err() {
            warn!(attempt = %report.attempt, "outcome receiver dropped");
        }
        if let Some((next, history)) = self.registry.finish(&report) {
            self.spawn(next, history);
        }
    }

    fn spawn(&self, event: LauncherEvent, history: Option<LaunchHistory>) {
        let attempt = event.attempt_id();
        let kind = event.kind();
        let task = (self.factory)(TaskInput { event, history });
        let permits = Arc::clone(&self.permits);
        let mut cancel = CancelSignal::new(self.cancel_rx.clone());
        let commands = self.commands_tx.clone();

        let span = info_span!("launcher_task", %attempt, %kind);
        tokio::spawn(
            async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = permits.acquire_owned() => permit.ok(),
                };
                let report = match permit {
                    // Run on its own task so a panic surfaces as a JoinError
                    // here instead of losing the report. The permit moves in
                    // and is released on unwind.
                    Some(permit) => {
                        let run = tokio::spawn(
                            async move {
                                let _permit = permit;
                                task.run(cancel).await
                            }
                            .in_current_span(),
                        );
                        match run.await {
                            Ok(report) => report,
                            Err(err) => {
                                error!(error = %err, "launcher task died");
                                TaskReport::aborted(attempt, kind, &err.to_string())
                            }
                        }
                    }
                    None => {
                        debug!("cancelled while waiting for a worker");
                        TaskReport::cancelled(attempt, kind)
                    }
                };
                let _ = commands.send(Command::Finished(report));
            }
            .instrument(span),
        );
    }

    fn publish_counts(&mut self) {
        self.counts.in_flight = self.registry.in_flight();
        self.counts.queued_cleanups = self.registry.queued_cleanups();
        self.counts_tx.send_replace(self.counts);
    }
}
