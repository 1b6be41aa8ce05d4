//! App - アプリケーション層
//!
//! ports を組み合わせてランチャーのロジックを実装します。
//!
//! # 主要コンポーネント
//! - **LauncherBuilder**: 構築とワイヤリング（fail-fast 検証）
//! - **LauncherDispatcher**: イベント受付、coalesce、worker pool
//! - **LaunchWorker**: 1 イベント分の LAUNCH / CLEANUP 実行
//! - **LaunchContextBuilder**: AM の起動仕様の組み立て
//! - **RetryPolicy**: node agent 呼び出しのバックオフ

pub mod builder;
pub mod context_builder;
pub mod dispatcher;
pub mod registry;
pub mod retry;
pub mod status;
pub mod worker;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, LauncherBuilder};
pub use self::context_builder::LaunchContextBuilder;
pub use self::dispatcher::LauncherDispatcher;
pub use self::retry::RetryPolicy;
pub use self::status::LauncherCounts;
pub use self::worker::{
    CancelSignal, LaunchHistory, LaunchTask, LaunchWorker, TaskFactory, TaskInput, TaskReport,
    TaskResult, WorkerDeps, WorkerState,
};
