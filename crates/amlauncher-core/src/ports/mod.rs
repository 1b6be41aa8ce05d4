//! Ports - 抽象化レイヤー
//!
//! ランチャーが所有しないコラボレーターとの境界にある trait 群。
//!
//! # 含まれる port
//! - **ContainerManager**: node agent のコンテナ管理プロトコル
//! - **ContainerEndpointResolver**: endpoint の解決
//! - **TokenIssuer**: token secret manager（読み取り専用）
//! - **Clock**: 現在時刻

pub mod clock;
pub mod container_manager;
pub mod endpoint_resolver;
pub mod token_issuer;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::container_manager::{
    ContainerManager, ContainerState, ContainerStatus, StartContainerRequest,
    StopContainerRequest,
};
pub use self::endpoint_resolver::ContainerEndpointResolver;
pub use self::token_issuer::TokenIssuer;
