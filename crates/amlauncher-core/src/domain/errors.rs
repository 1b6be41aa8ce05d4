//! Errors - ランチャーのエラー型と分類
//!
//! - `LauncherError`: ランチャーが報告するエラー（`FailureKind` 経由で
//!   attempt state machine にも届く）
//! - `RemoteError`: node agent 呼び出しの失敗。worker の中だけで扱い、
//!   外に出る前に `LauncherError` に畳み込む

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::ContainerId;

/// ErrorKind classifies remote failures for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth retrying (timeout, connection refused).
    Transient,
    /// Retrying cannot help (explicit refusal, unknown container).
    Permanent,
}

#[derive(Debug, Clone, Error)]
pub enum LauncherError {
    #[error("endpoint unavailable for node {node}: {reason}")]
    EndpointUnavailable { node: String, reason: String },

    #[error("invalid launch configuration: {0}")]
    Configuration(String),

    #[error("launch rejected by node agent: {0}")]
    LaunchRejected(String),

    #[error("launch timed out after {attempts} attempt(s): {last_error}")]
    LaunchTimedOut { attempts: u32, last_error: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("launcher is shutting down")]
    ShuttingDown,
}

impl LauncherError {
    /// Failure kind reported to the attempt state machine, if this error is
    /// one a launch can end with.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::EndpointUnavailable { .. } => Some(FailureKind::EndpointUnavailable),
            Self::Configuration(_) => Some(FailureKind::ConfigurationError),
            Self::LaunchRejected(_) => Some(FailureKind::LaunchRejected),
            Self::LaunchTimedOut { .. } => Some(FailureKind::LaunchTimedOut),
            Self::InvalidState(_) | Self::ShuttingDown => None,
        }
    }
}

/// Terminal launch failure taxonomy carried by outcome events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    EndpointUnavailable,
    ConfigurationError,
    LaunchRejected,
    LaunchTimedOut,
}

/// Failure of a single call to a node agent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("container {0} not found")]
    ContainerNotFound(ContainerId),
}

impl RemoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) | Self::ConnectionRefused(_) => ErrorKind::Transient,
            Self::Rejected(_) | Self::ContainerNotFound(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
