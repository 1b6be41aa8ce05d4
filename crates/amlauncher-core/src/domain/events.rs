//! Events - attempt state machine とランチャー間のメッセージ
//!
//! - `LauncherEvent`: 入力（LAUNCH / CLEANUP 要求）
//! - `OutcomeEvent`: 出力。終了した task ごとにちょうど 1 件

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::allocation::AppAttempt;
use super::errors::{FailureKind, LauncherError};
use super::ids::AttemptIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LauncherEventKind {
    Launch,
    Cleanup,
}

impl fmt::Display for LauncherEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launch => f.write_str("LAUNCH"),
            Self::Cleanup => f.write_str("CLEANUP"),
        }
    }
}

/// Request to launch or clean up an attempt's AM.
#[derive(Debug, Clone)]
pub struct LauncherEvent {
    kind: LauncherEventKind,
    attempt: Arc<AppAttempt>,
    created_at: DateTime<Utc>,
}

impl LauncherEvent {
    pub fn new(kind: LauncherEventKind, attempt: Arc<AppAttempt>, created_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            attempt,
            created_at,
        }
    }

    pub fn launch(attempt: Arc<AppAttempt>, created_at: DateTime<Utc>) -> Self {
        Self::new(LauncherEventKind::Launch, attempt, created_at)
    }

    pub fn cleanup(attempt: Arc<AppAttempt>, created_at: DateTime<Utc>) -> Self {
        Self::new(LauncherEventKind::Cleanup, attempt, created_at)
    }

    pub fn kind(&self) -> LauncherEventKind {
        self.kind
    }

    pub fn attempt(&self) -> &Arc<AppAttempt> {
        &self.attempt
    }

    pub fn attempt_id(&self) -> AttemptIdentity {
        self.attempt.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Result of one launcher task, delivered back to the attempt state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OutcomeEvent {
    /// AM launched.
    Launched { attempt: AttemptIdentity },

    /// LAUNCH ended in a terminal failure. The launcher does not retry it.
    LaunchFailed {
        attempt: AttemptIdentity,
        kind: FailureKind,
        reason: String,
    },

    /// AM cleaned up. Also reported when the remote side did not cooperate.
    CleanedUp { attempt: AttemptIdentity },

    /// Task was cancelled by shutdown before it reached the node agent.
    Cancelled {
        attempt: AttemptIdentity,
        kind: LauncherEventKind,
    },
}

impl OutcomeEvent {
    pub fn launch_failed(attempt: AttemptIdentity, error: &LauncherError) -> Self {
        Self::LaunchFailed {
            attempt,
            // Workers only ever fail a launch with a classified error.
            kind: error
                .failure_kind()
                .unwrap_or(FailureKind::ConfigurationError),
            reason: error.to_string(),
        }
    }

    pub fn attempt(&self) -> AttemptIdentity {
        match self {
            Self::Launched { attempt }
            | Self::LaunchFailed { attempt, .. }
            | Self::CleanedUp { attempt }
            | Self::Cancelled { attempt, .. } => *attempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::ApplicationId;

    #[test]
    fn outcome_is_tagged_json() {
        let attempt = AttemptIdentity::new(ApplicationId::new(1000, 7), 2);
        let event = OutcomeEvent::launch_failed(
            attempt,
            &LauncherError::LaunchRejected("quota".into()),
        );
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["outcome"], "launch_failed");
        assert_eq!(v["kind"], "LAUNCH_REJECTED");
        assert_eq!(event.attempt(), attempt);
    }
}
