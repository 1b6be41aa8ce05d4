//! LauncherBuilder - ランチャーの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）

use std::sync::Arc;

use tokio::sync::mpsc;

use super::dispatcher::{DispatcherParts, LauncherDispatcher};
use super::worker::{TaskFactory, WorkerDeps};
use crate::config::{ConfigError, LauncherConfig};
use crate::domain::OutcomeEvent;
use crate::ports::{Clock, ContainerEndpointResolver, SystemClock, TokenIssuer};

/// LauncherBuilder はディスパッチャーを構築
///
/// # 使用例
/// ```ignore
/// let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
/// let launcher = LauncherBuilder::new(config)
///     .resolver(resolver)
///     .token_issuer(tokens)
///     .outcomes(tx)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - build() 時に必須コラボレーターと設定値を検証
/// - 不足があれば BuildError を返す
pub struct LauncherBuilder {
    config: LauncherConfig,
    resolver: Option<Arc<dyn ContainerEndpointResolver>>,
    tokens: Option<Arc<dyn TokenIssuer>>,
    clock: Arc<dyn Clock>,
    factory: Option<TaskFactory>,
    outcomes: Option<mpsc::UnboundedSender<OutcomeEvent>>,
}

/// BuildError はランチャー構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing collaborator: {0}. It must be set before build().")]
    MissingCollaborator(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("build() must be called from within a Tokio runtime")]
    NoRuntime,
}

impl LauncherBuilder {
    pub fn new(config: LauncherConfig) -> Self {
        Self {
            config,
            resolver: None,
            tokens: None,
            clock: Arc::new(SystemClock),
            factory: None,
            outcomes: None,
        }
    }

    pub fn resolver(mut self, resolver: Arc<dyn ContainerEndpointResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn token_issuer(mut self, tokens: Arc<dyn TokenIssuer>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Defaults to `SystemClock`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the default `LaunchWorker` tasks. Resolver and token issuer
    /// are then optional.
    pub fn task_factory(mut self, factory: TaskFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Where `OutcomeEvent`s are delivered.
    pub fn outcomes(mut self, outcomes: mpsc::UnboundedSender<OutcomeEvent>) -> Self {
        self.outcomes = Some(outcomes);
        self
    }

    /// 検証してディスパッチャーを起動
    ///
    /// # 検証
    /// - 設定値 (`LauncherConfig::validate`)
    /// - outcome の送信先
    /// - task_factory が無ければ resolver と token_issuer
    pub fn build(self) -> Result<LauncherDispatcher, BuildError> {
        self.config.validate()?;

        let outcomes = self
            .outcomes
            .ok_or(BuildError::MissingCollaborator("outcomes"))?;

        let factory = match self.factory {
            Some(factory) => factory,
            None => {
                let resolver = self
                    .resolver
                    .ok_or(BuildError::MissingCollaborator("resolver"))?;
                let tokens = self
                    .tokens
                    .ok_or(BuildError::MissingCollaborator("token_issuer"))?;
                WorkerDeps::from_config(&self.config, resolver, tokens).into_factory()
            }
        };

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(BuildError::NoRuntime);
        }

        Ok(LauncherDispatcher::start(DispatcherParts {
            worker_pool_size: self.config.worker_pool_size,
            shutdown_grace: self.config.shutdown_grace(),
            factory,
            clock: self.clock,
            outcomes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{HmacTokenIssuer, StaticEndpointResolver};

    fn complete(tx: mpsc::UnboundedSender<OutcomeEvent>) -> LauncherBuilder {
        LauncherBuilder::new(LauncherConfig::default())
            .resolver(Arc::new(StaticEndpointResolver::new()))
            .token_issuer(Arc::new(HmacTokenIssuer::new(b"m".to_vec(), b"c".to_vec())))
            .outcomes(tx)
    }

    #[tokio::test]
    async fn test_build_success() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let launcher = complete(tx).build();
        assert!(launcher.is_ok());
    }

    #[tokio::test]
    async fn test_build_missing_resolver() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = LauncherBuilder::new(LauncherConfig::default())
            .token_issuer(Arc::new(HmacTokenIssuer::new(b"m".to_vec(), b"c".to_vec())))
            .outcomes(tx)
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingCollaborator("resolver"))
        ));
    }

    #[tokio::test]
    async fn test_build_missing_outcomes() {
        let result = LauncherBuilder::new(LauncherConfig::default()).build();
        assert!(matches!(
            result,
            Err(BuildError::MissingCollaborator("outcomes"))
        ));
    }

    #[tokio::test]
    async fn test_build_rejects_zero_pool() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = LauncherConfig {
            worker_pool_size: 0,
            ..LauncherConfig::default()
        };
        let result = complete(tx);
        let result = LauncherBuilder { config, ..result }.build();
        assert!(matches!(result, Err(BuildError::Config(_))));
    }

    #[test]
    fn test_build_outside_runtime() {
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(complete(tx).build(), Err(BuildError::NoRuntime)));
    }
}
