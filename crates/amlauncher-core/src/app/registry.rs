//! InFlightRegistry - attempt ごとの実行中スロットと launch 履歴
//!
//! # 学習ポイント
//! - actor task だけが触るのでロック不要（single-writer）
//! - check-and-insert / remove が 1 ステップで完結する
//!
//! # 前提
//! 成功した LAUNCH の履歴（endpoint を含む）は CLEANUP の完了まで保持される。
//! attempt state machine は launch 済みの attempt に必ず CLEANUP を送ること。

use std::collections::HashMap;

use super::worker::{LaunchHistory, TaskReport, TaskResult};
use crate::domain::{AttemptIdentity, LauncherEvent, LauncherEventKind};

/// Decision for an incoming event.
#[derive(Debug)]
pub enum Admission {
    /// Start a task now.
    Start(LauncherEvent, Option<LaunchHistory>),
    /// Same kind already running for the attempt.
    Coalesced,
    /// CLEANUP parked until the running LAUNCH reports.
    Queued,
    /// LAUNCH that must not run (cleanup pending, or already launched).
    Dropped(&'static str),
}

#[derive(Debug)]
struct Slot {
    active: LauncherEventKind,
    queued_cleanup: Option<LauncherEvent>,
}

/// InFlightRegistry は attempt ごとのスロットと launch 履歴を保持
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    slots: HashMap<AttemptIdentity, Slot>,
    history: HashMap<AttemptIdentity, LaunchHistory>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, event: LauncherEvent) -> Admission {
        let id = event.attempt_id();
        let kind = event.kind();

        if let Some(slot) = self.slots.get_mut(&id) {
            return match (slot.active, kind) {
                (LauncherEventKind::Launch, LauncherEventKind::Launch) => {
                    if slot.queued_cleanup.is_some() {
                        Admission::Dropped("cleanup pending")
                    } else {
                        Admission::Coalesced
                    }
                }
                (LauncherEventKind::Cleanup, LauncherEventKind::Cleanup) => Admission::Coalesced,
                (LauncherEventKind::Cleanup, LauncherEventKind::Launch) => {
                    Admission::Dropped("cleanup in progress")
                }
                (LauncherEventKind::Launch, LauncherEventKind::Cleanup) => {
                    if slot.queued_cleanup.is_some() {
                        Admission::Coalesced
                    } else {
                        slot.queued_cleanup = Some(event);
                        Admission::Queued
                    }
                }
            };
        }

        if kind == LauncherEventKind::Launch
            && matches!(self.history.get(&id), Some(LaunchHistory::Launched { .. }))
        {
            return Admission::Dropped("already launched");
        }

        self.slots.insert(
            id,
            Slot {
                active: kind,
                queued_cleanup: None,
            },
        );
        Admission::Start(event, self.history.get(&id).cloned())
    }

    /// Record a finished task. Returns the queued CLEANUP to start next, if any.
    pub fn finish(&mut self, report: &TaskReport) -> Option<(LauncherEvent, Option<LaunchHistory>)> {
        let id = report.attempt;
        match &report.result {
            TaskResult::Launched {
                endpoint,
                container,
            } => {
                self.history.insert(
                    id,
                    LaunchHistory::Launched {
                        endpoint: endpoint.clone(),
                        container: *container,
                    },
                );
            }
            TaskResult::LaunchFailed {
                reached_remote: true,
                ..
            } => {
                self.history.insert(id, LaunchHistory::Attempted);
            }
            // Cleanup cancelled by shutdown: nothing will retry it.
            TaskResult::CleanedUp | TaskResult::Cancelled
                if report.kind == LauncherEventKind::Cleanup =>
            {
                self.history.remove(&id);
            }
            TaskResult::CleanedUp | TaskResult::LaunchFailed { .. } | TaskResult::Cancelled => {}
        }

        let slot = self.slots.get_mut(&id)?;
        match slot.queued_cleanup.take() {
            Some(next) => {
                slot.active = LauncherEventKind::Cleanup;
                Some((next, self.history.get(&id).cloned()))
            }
            None => {
                self.slots.remove(&id);
                None
            }
        }
    }

    /// Attempts whose launch history is still held.
    pub fn remembered(&self) -> usize {
        self.history.len()
    }

    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn queued_cleanups(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.queued_cleanup.is_some())
            .count()
    }

    pub fn is_idle(&self) -> bool {
        self.slots.is_empty()
    }
}
