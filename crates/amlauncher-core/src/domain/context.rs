//! LaunchContext - node agent が AM を起動するための仕様

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::allocation::Resource;
use super::ids::ContainerId;

/// Env key the AM reads to learn its own attempt identity.
pub const APPLICATION_ATTEMPT_ID_ENV: &str = "APPLICATION_ATTEMPT_ID_ENV";
/// Env key carrying the AM container id.
pub const AM_CONTAINER_ID_ENV: &str = "AM_CONTAINER_ID";
/// Env keys carrying the hosting node agent's address.
pub const NM_HOST_ENV: &str = "NM_HOST";
pub const NM_PORT_ENV: &str = "NM_PORT";
/// Env key carrying the application submission time (epoch millis).
pub const APP_SUBMIT_TIME_ENV: &str = "APP_SUBMIT_TIME_ENV";
/// Env key carrying the base64 client token secret.
pub const APPLICATION_CLIENT_SECRET_ENV: &str = "AppClientTokenEnv";

/// Opaque security token blob.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityToken {
    kind: String,
    service: String,
    secret: Vec<u8>,
}

impl SecurityToken {
    pub fn new(kind: impl Into<String>, service: impl Into<String>, secret: Vec<u8>) -> Self {
        Self {
            kind: kind.into(),
            service: service.into(),
            secret,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for SecurityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityToken")
            .field("kind", &self.kind)
            .field("service", &self.service)
            .field("secret", &format_args!("<{} bytes>", self.secret.len()))
            .finish()
    }
}

/// Tokens handed to the AM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Application-scoped master token, used by the AM to talk to the RM.
    pub application_token: SecurityToken,
    /// Token clients present when talking to the AM.
    pub client_token: SecurityToken,
}

/// Launch specification for one AM container. Built fresh per launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchContext {
    pub container: ContainerId,
    pub commands: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub credentials: Credentials,
    pub resource: Resource,
}

impl LaunchContext {
    /// The attempt identity string injected for the AM, if present.
    pub fn attempt_env(&self) -> Option<&str> {
        self.environment
            .get(APPLICATION_ATTEMPT_ID_ENV)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret() {
        let token = SecurityToken::new("AM_TOKEN", "rm", vec![1, 2, 3]);
        let rendered = format!("{token:?}");
        assert!(rendered.contains("<3 bytes>"));
        assert!(!rendered.contains("[1, 2, 3]"));
    }
}
