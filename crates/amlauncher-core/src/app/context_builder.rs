//! LaunchContextBuilder - AM 起動仕様の組み立て
//!
//! # 学習ポイント
//! - 純粋関数としての builder（同じ入力なら同じ出力）
//! - 予約済み環境変数はユーザー指定より優先

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::domain::{
    AM_CONTAINER_ID_ENV, APP_SUBMIT_TIME_ENV, APPLICATION_ATTEMPT_ID_ENV,
    APPLICATION_CLIENT_SECRET_ENV, AppAttempt, AmAllocation, Credentials, LaunchContext,
    LauncherError, NM_HOST_ENV, NM_PORT_ENV, SecurityToken,
};

/// LaunchContextBuilder は `LaunchContext` を組み立てる（純粋関数）
#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchContextBuilder;

impl LaunchContextBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the launch context for `attempt` on `allocation`.
    ///
    /// The user environment is copied first and the launcher's reserved keys
    /// are written over it, so `APPLICATION_ATTEMPT_ID_ENV` is always exactly
    /// `attempt.id.to_string()`.
    ///
    /// # Errors
    /// `LauncherError::Configuration` if the allocation has no command, or the
    /// command is empty or starts with a blank token.
    pub fn build(
        &self,
        attempt: &AppAttempt,
        allocation: &AmAllocation,
        master_token: SecurityToken,
        client_token: SecurityToken,
    ) -> Result<LaunchContext, LauncherError> {
        let commands = match &allocation.command {
            None => {
                return Err(LauncherError::Configuration(format!(
                    "no AM command specified for {}",
                    attempt.id
                )));
            }
            Some(cmd) if cmd.first().is_none_or(|c| c.trim().is_empty()) => {
                return Err(LauncherError::Configuration(format!(
                    "empty AM command for {}",
                    attempt.id
                )));
            }
            Some(cmd) => cmd.clone(),
        };

        let mut environment = allocation.environment.clone();
        environment.insert(APPLICATION_ATTEMPT_ID_ENV.to_string(), attempt.id.to_string());
        environment.insert(
            AM_CONTAINER_ID_ENV.to_string(),
            allocation.container.to_string(),
        );
        environment.insert(NM_HOST_ENV.to_string(), allocation.node.host().to_string());
        environment.insert(NM_PORT_ENV.to_string(), allocation.node.port().to_string());
        environment.insert(
            APP_SUBMIT_TIME_ENV.to_string(),
            attempt.submitted_at.timestamp_millis().to_string(),
        );
        environment.insert(
            APPLICATION_CLIENT_SECRET_ENV.to_string(),
            STANDARD.encode(client_token.secret()),
        );

        Ok(LaunchContext {
            container: allocation.container,
            commands,
            environment,
            credentials: Credentials {
                application_token: master_token,
                client_token,
            },
            resource: allocation.resource,
        })
    }
}
