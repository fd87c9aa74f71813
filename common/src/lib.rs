//! Endpoint Resolver Common
//!
//! リゾルバーとその利用者が共有する型・エラー・設定

#![warn(missing_docs)]

/// 設定管理（設定ファイル + 環境変数）
pub mod config;

/// エラー型定義
pub mod error;

/// エンドポイントのデータモデル
pub mod types;

/// URL検証と正規化
pub mod url;

pub use error::{ResolverError, ResolverResult};
pub use types::{CandidateSource, EndpointCandidate, EndpointChange, ResolvedEndpoint};
