//! 設定管理
//!
//! ResolverConfig: キー名・タイムアウト・リトライ回数などの設定構造体
//!
//! 読み込み順（後勝ち）: デフォルト値 → 設定ファイル（TOML/JSON、任意） → `RESOLVER_*` 環境変数

use crate::error::{ResolverError, ResolverResult};
use crate::url::is_valid_url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 環境変数のプレフィックス（例: `RESOLVER_FETCH_ATTEMPTS`）
pub const ENV_PREFIX: &str = "RESOLVER";

/// リゾルバー設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolverConfig {
    /// 永続ストレージのキー (デフォルト: "@api_url")
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// リモート設定のキー (デフォルト: "api_url")
    #[serde(default = "default_remote_key")]
    pub remote_key: String,

    /// リモート設定ストアのURL（未設定の場合は空文字）
    #[serde(default)]
    pub remote_url: String,

    /// リモート設定ストアの認証トークン
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_auth_token: Option<String>,

    /// キャッシュファイルのパス (デフォルト: "endpoint-cache.json")
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// 単発取得の最大試行回数 (デフォルト: 2)
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,

    /// 単発取得のリトライ間隔（ミリ秒）(デフォルト: 1500)
    #[serde(default = "default_fetch_retry_delay_ms")]
    pub fetch_retry_delay_ms: u64,

    /// 単発取得1回あたりのタイムアウト（ミリ秒）(デフォルト: 5000)
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// ライブ更新待機のタイムアウト（ミリ秒）(デフォルト: 10000)
    #[serde(default = "default_live_update_timeout_ms")]
    pub live_update_timeout_ms: u64,

    /// 生存確認のタイムアウト（ミリ秒）(デフォルト: 5000)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// ライブ更新リスナー再接続までの待機（ミリ秒）(デフォルト: 3000)
    #[serde(default = "default_resubscribe_delay_ms")]
    pub resubscribe_delay_ms: u64,
}

fn default_storage_key() -> String {
    "@api_url".to_string()
}

fn default_remote_key() -> String {
    "api_url".to_string()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("endpoint-cache.json")
}

fn default_fetch_attempts() -> u32 {
    2
}

fn default_fetch_retry_delay_ms() -> u64 {
    1500
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

fn default_live_update_timeout_ms() -> u64 {
    10_000
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_resubscribe_delay_ms() -> u64 {
    3000
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            remote_key: default_remote_key(),
            remote_url: String::new(),
            remote_auth_token: None,
            storage_path: default_storage_path(),
            fetch_attempts: default_fetch_attempts(),
            fetch_retry_delay_ms: default_fetch_retry_delay_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            live_update_timeout_ms: default_live_update_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            resubscribe_delay_ms: default_resubscribe_delay_ms(),
        }
    }
}

impl ResolverConfig {
    /// 設定ファイルと環境変数から読み込む
    ///
    /// `path`が指定されていても存在しなければ無視する。
    pub fn load(path: Option<&Path>) -> ResolverResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .ignore_empty(true),
        );

        let config: ResolverConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 設定値の整合性を検証
    pub fn validate(&self) -> ResolverResult<()> {
        if self.storage_key.trim().is_empty() {
            return Err(ResolverError::Config("storage_key must not be empty".into()));
        }
        if self.remote_key.trim().is_empty() {
            return Err(ResolverError::Config("remote_key must not be empty".into()));
        }
        if !self.remote_url.is_empty() && !is_valid_url(&self.remote_url) {
            return Err(ResolverError::Config(format!(
                "remote_url is not a valid http(s) URL: {}",
                self.remote_url
            )));
        }

        let timeouts = [
            ("fetch_timeout_ms", self.fetch_timeout_ms),
            ("live_update_timeout_ms", self.live_update_timeout_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ResolverError::Config(format!("{} must be positive", name)));
            }
        }

        Ok(())
    }

    /// 単発取得のリトライ間隔
    pub fn fetch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_delay_ms)
    }

    /// 単発取得1回あたりのタイムアウト
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// ライブ更新待機のタイムアウト
    pub fn live_update_timeout(&self) -> Duration {
        Duration::from_millis(self.live_update_timeout_ms)
    }

    /// 生存確認のタイムアウト
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// リスナー再接続までの待機
    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.resubscribe_delay_ms)
    }
}
