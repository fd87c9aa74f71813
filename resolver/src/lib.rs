//! Dynamic endpoint resolver
//!
//! バックエンドのベースURLを探索・検証・キャッシュし、ライブ更新に追従する。

#![warn(missing_docs)]

/// ローカルキャッシュ（永続ストレージ）
pub mod cache;

/// CLIサブコマンド
pub mod cli;

/// 設定管理（環境変数ヘルパー）
pub mod config;

/// 変更通知（コールバック・イベントバス）
pub mod events;

/// ロギング初期化ユーティリティ
pub mod logging;

/// 生存確認
pub mod probe;

/// リモート設定チャネル
pub mod remote;

/// エンドポイントリゾルバー本体
pub mod resolver;

/// リトライポリシー
pub mod retry;

/// シャットダウン制御
pub mod shutdown;

pub use endpoint_resolver_common::{
    CandidateSource, EndpointCandidate, EndpointChange, ResolvedEndpoint, ResolverError,
    ResolverResult,
};
pub use resolver::{Resolver, ResolverBuilder, ResolverState};
