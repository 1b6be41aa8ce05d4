//! amlauncher-core
//!
//! Application Master ランチャー: attempt ごとの LAUNCH / CLEANUP イベントを
//! node agent への container start / stop 呼び出しに変換する。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, allocation, context, events, errors）
//! - **ports**: 抽象化レイヤー（ContainerManager, ContainerEndpointResolver, TokenIssuer, Clock）
//! - **app**: アプリケーションロジック（builder, dispatcher, worker, context_builder, retry）
//! - **impls**: 実装（InMemoryNodeManager など開発用・テスト用）
//! - **config**: 起動時設定（TOML）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{BuildError, LauncherBuilder, LauncherCounts, LauncherDispatcher};
pub use config::{ConfigError, LauncherConfig, LoggingConfig};
