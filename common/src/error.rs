//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! バリデータ・キャッシュ由来のエラーはリゾルバー内部で吸収され、
//! 呼び出し元に届くのは全戦略が尽きた場合の`EndpointUnresolved`のみ。

use thiserror::Error;

/// Endpoint resolution error type
///
/// 実行中の解決処理の結果を複数の待機者へ配布するため`Clone`を実装する。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolverError {
    /// URL validation failed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Persistent storage read/write failed (degraded, non-fatal)
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// One-shot remote read failed or returned an invalid payload
    #[error("Remote fetch failed: {0}")]
    RemoteFetchFailed(String),

    /// All discovery strategies were exhausted
    #[error("Endpoint unresolved: {0}")]
    EndpointUnresolved(String),

    /// Liveness probe was negative (advisory only)
    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResolverError {
    /// 呼び出し元に致命的なエラーとして扱うべきか
    ///
    /// `InvalidUrl`/`CacheUnavailable`/`RemoteFetchFailed`/`ProbeFailed`は
    /// 次の戦略へ進むための内部状態であり、単体では致命的ではない。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::EndpointUnresolved(_) | Self::Config(_) | Self::Internal(_)
        )
    }

    /// ログ出力用の短い分類名
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid_url",
            Self::CacheUnavailable(_) => "cache_unavailable",
            Self::RemoteFetchFailed(_) => "remote_fetch_failed",
            Self::EndpointUnresolved(_) => "endpoint_unresolved",
            Self::ProbeFailed(_) => "probe_failed",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for ResolverError {
    fn from(err: serde_json::Error) -> Self {
        Self::CacheUnavailable(format!("serialization error: {}", err))
    }
}

impl From<config::ConfigError> for ResolverError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result alias
pub type ResolverResult<T> = Result<T, ResolverError>;
