//! Allocation - scheduler から渡される割り当てと attempt

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AttemptIdentity, ContainerId, NodeId};

/// Resource limits of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub memory_mb: u64,
    pub vcores: u32,
}

impl Resource {
    pub fn new(memory_mb: u64, vcores: u32) -> Self {
        Self { memory_mb, vcores }
    }
}

/// The container allocated for an AM, together with the AM container spec
/// taken from the application submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmAllocation {
    pub container: ContainerId,
    pub node: NodeId,
    pub resource: Resource,

    /// AM command line, one token per element. `None` means the submission
    /// never specified one.
    #[serde(default)]
    pub command: Option<Vec<String>>,

    /// Environment requested by the submitter. Reserved launcher keys win
    /// over same-named entries here.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl AmAllocation {
    pub fn new(container: ContainerId, node: NodeId, resource: Resource) -> Self {
        Self {
            container,
            node,
            resource,
            command: None,
            environment: BTreeMap::new(),
        }
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }
}

/// One attempt of an application as the attempt state machine sees it.
///
/// Events refer to attempts through `Arc<AppAttempt>`; the launcher never
/// owns or mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppAttempt {
    pub id: AttemptIdentity,
    pub allocation: AmAllocation,
    pub submitted_at: DateTime<Utc>,
}

impl AppAttempt {
    pub fn new(id: AttemptIdentity, allocation: AmAllocation, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id,
            allocation,
            submitted_at,
        }
    }
}
