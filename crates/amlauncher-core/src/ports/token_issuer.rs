//! TokenIssuer - token secret manager への読み取り専用アクセス

use crate::domain::{AttemptIdentity, LauncherError, SecurityToken};

/// Issues the tokens injected into an AM launch.
///
/// Issuers are shared read-mostly state; the launcher only asks for a
/// snapshot at build time and never mutates them.
pub trait TokenIssuer: Send + Sync {
    /// Application-scoped master token the AM uses against the RM.
    fn application_token(&self, attempt: AttemptIdentity) -> Result<SecurityToken, LauncherError>;

    /// Token clients present to the AM.
    fn client_token(&self, attempt: AttemptIdentity) -> Result<SecurityToken, LauncherError>;
}
