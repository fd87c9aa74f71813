//! ローカルキャッシュ
//!
//! 最後に受理したエンドポイントURLを永続ストレージの単一スロットに保持する。

pub mod storage;

pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};

use endpoint_resolver_common::url::is_valid_url;
use endpoint_resolver_common::ResolverResult;
use std::sync::Arc;
use tracing::{debug, warn};

/// エンドポイントURLのローカルキャッシュ
#[derive(Clone)]
pub struct LocalCache {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl LocalCache {
    /// ストレージとキーを指定して作成
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// ストレージキー
    pub fn key(&self) -> &str {
        &self.key
    }

    /// キャッシュ済みURLを読み出す
    ///
    /// 保存値が不正なURLの場合はキャッシュミスとして扱う。
    /// ストレージエラーは`CacheUnavailable`として返す。
    pub async fn read(&self) -> ResolverResult<Option<String>> {
        let stored = self.storage.get(&self.key).await?;

        match stored {
            Some(url) if is_valid_url(&url) => {
                debug!(key = %self.key, url = %url, "Cache hit");
                Ok(Some(url))
            }
            Some(url) => {
                warn!(key = %self.key, value = %url, "Ignoring invalid cached URL");
                Ok(None)
            }
            None => {
                debug!(key = %self.key, "Cache miss");
                Ok(None)
            }
        }
    }

    /// URLを書き込む（既存値は上書き）
    pub async fn write(&self, url: &str) -> ResolverResult<()> {
        self.storage.set(&self.key, url).await
    }
}
