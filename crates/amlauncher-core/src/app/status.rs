//! Status - ランチャーの状態スナップショット

use serde::Serialize;

use crate::domain::OutcomeEvent;

/// LauncherCounts は dispatcher が変化のたびに公開するカウンタ
///
/// `in_flight` and `queued_cleanups` are gauges; the rest only grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LauncherCounts {
    pub in_flight: usize,
    pub queued_cleanups: usize,
    pub launched: u64,
    pub launch_failures: u64,
    pub cleaned_up: u64,
    pub cancelled: u64,
    /// Events absorbed by an already active or queued task.
    pub coalesced: u64,
    /// LAUNCH events refused (cleanup pending, already launched, shutdown).
    pub dropped: u64,
}

impl LauncherCounts {
    pub(crate) fn record(&mut self, outcome: &OutcomeEvent) {
        match outcome {
            OutcomeEvent::Launched { .. } => self.launched += 1,
            OutcomeEvent::LaunchFailed { .. } => self.launch_failures += 1,
            OutcomeEvent::CleanedUp { .. } => self.cleaned_up += 1,
            OutcomeEvent::Cancelled { .. } => self.cancelled += 1,
        }
    }

    /// Finished tasks of any kind.
    pub fn finished(&self) -> u64 {
        self.launched + self.launch_failures + self.cleaned_up + self.cancelled
    }
}
