//! 永続キーバリューストレージ
//!
//! ローカルキャッシュが利用するストレージの抽象と実装
//!
//! - `FileStorage`: JSONファイル（一時ファイル + renameで原子的に書き込み）
//! - `MemoryStorage`: プロセス内マップ（テスト・一時実行用）

use async_trait::async_trait;
use endpoint_resolver_common::{ResolverError, ResolverResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// キーバリューストレージ
///
/// エラーはすべて`CacheUnavailable`として返す。
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// 値を取得
    async fn get(&self, key: &str) -> ResolverResult<Option<String>>;

    /// 値を保存（既存値は上書き）
    async fn set(&self, key: &str, value: &str) -> ResolverResult<()>;
}

/// JSONファイルによる永続ストレージ
///
/// ファイルは`{"@api_url": "https://..."}`形式のオブジェクト。
/// ファイルが存在しない場合は空のストアとして扱う。
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileStorage {
    /// 指定パスのストレージを作成（ファイルは最初の書き込み時に作成される）
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// ファイルパス
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> ResolverResult<BTreeMap<String, String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(ResolverError::CacheUnavailable(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        Ok(serde_json::from_str(&content)?)
    }

    async fn write_all(&self, entries: &BTreeMap<String, String>) -> ResolverResult<()> {
        let io_err = |e: std::io::Error| {
            ResolverError::CacheUnavailable(format!(
                "failed to write {}: {}",
                self.path.display(),
                e
            ))
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }

        let body = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn get(&self, key: &str) -> ResolverResult<Option<String>> {
        let entries = self.read_all().await?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> ResolverResult<()> {
        // read-modify-write を直列化する
        let _guard = self.write_lock.lock().await;

        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries).await?;

        debug!(path = %self.path.display(), key = key, "Storage entry written");
        Ok(())
    }
}

/// プロセス内ストレージ
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStorage {
    /// 空のストレージを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 初期値付きで作成
    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(key.to_string(), value.to_string());
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> ResolverResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> ResolverResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
