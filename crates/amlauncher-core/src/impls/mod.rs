//! Impls - 実装（開発用・テスト用）
//!
//! ports の実装。本番の RPC クライアントや secret manager はこのクレートの外。
//!
//! # 含まれる実装
//! - **InMemoryNodeManager**: 呼び出しを記録する node agent
//! - **StaticEndpointResolver**: node → endpoint の固定テーブル
//! - **HmacTokenIssuer**: HMAC-SHA256 で attempt ごとの token を導出

pub mod hmac_tokens;
pub mod inmem_node;
pub mod static_resolver;

pub use self::hmac_tokens::HmacTokenIssuer;
pub use self::inmem_node::{CallRecord, InMemoryNodeManager};
pub use self::static_resolver::StaticEndpointResolver;
