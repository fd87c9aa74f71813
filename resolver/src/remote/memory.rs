//! プロセス内リモート設定チャネル
//!
//! `tokio::sync::broadcast`によるプッシュ対応ストア。テストや組み込み用途向け。

use super::{LiveUpdates, RemoteConfigChannel};
use async_trait::async_trait;
use endpoint_resolver_common::{ResolverError, ResolverResult};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// チャネルの容量
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
enum ChannelEvent {
    Value { key: String, value: Option<String> },
    Terminated(String),
}

/// プロセス内リモート設定チャネル
#[derive(Clone)]
pub struct MemoryChannel {
    inner: Arc<Inner>,
}

struct Inner {
    values: RwLock<HashMap<String, String>>,
    sender: broadcast::Sender<ChannelEvent>,
    available: AtomicBool,
    fetch_count: AtomicU64,
    subscribe_count: AtomicU64,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    /// 空のチャネルを作成
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                values: RwLock::new(HashMap::new()),
                sender,
                available: AtomicBool::new(true),
                fetch_count: AtomicU64::new(0),
                subscribe_count: AtomicU64::new(0),
            }),
        }
    }

    /// 値を設定し、購読者へ配信する
    pub fn publish(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.inner.values.write() {
            values.insert(key.to_string(), value.to_string());
        }
        let _ = self.inner.sender.send(ChannelEvent::Value {
            key: key.to_string(),
            value: Some(value.to_string()),
        });
    }

    /// 値を削除し、購読者へ配信する
    pub fn remove(&self, key: &str) {
        if let Ok(mut values) = self.inner.values.write() {
            values.remove(key);
        }
        let _ = self.inner.sender.send(ChannelEvent::Value {
            key: key.to_string(),
            value: None,
        });
    }

    /// 全購読者に終端エラーを配信する
    pub fn terminate_subscribers(&self, reason: &str) {
        let _ = self
            .inner
            .sender
            .send(ChannelEvent::Terminated(reason.to_string()));
    }

    /// 可用性を切り替える（falseの間は取得・購読が失敗する）
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// 単発取得の呼び出し回数
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetch_count.load(Ordering::SeqCst)
    }

    /// 購読の呼び出し回数
    pub fn subscribe_count(&self) -> u64 {
        self.inner.subscribe_count.load(Ordering::SeqCst)
    }

    /// 現在の購読者数
    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    fn current(&self, key: &str) -> Option<String> {
        self.inner
            .values
            .read()
            .ok()
            .and_then(|values| values.get(key).cloned())
    }

    fn ensure_available(&self) -> ResolverResult<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ResolverError::RemoteFetchFailed(
                "remote config store unavailable".into(),
            ))
        }
    }
}

#[async_trait]
impl RemoteConfigChannel for MemoryChannel {
    async fn get(&self, key: &str) -> ResolverResult<Option<String>> {
        self.inner.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        Ok(self.current(key))
    }

    async fn subscribe(&self, key: &str) -> ResolverResult<LiveUpdates> {
        self.inner.subscribe_count.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        // 現在値の取得より先に受信側を作り、取りこぼしを防ぐ
        let receiver = self.inner.sender.subscribe();
        let initial = self.current(key).map(|value| Ok(Some(value)));
        let key = key.to_string();

        let updates = stream::unfold(Some(receiver), move |state| {
            let key = key.clone();
            async move {
                let mut receiver = state?;
                loop {
                    match receiver.recv().await {
                        Ok(ChannelEvent::Value { key: event_key, value }) if event_key == key => {
                            return Some((Ok(value), Some(receiver)));
                        }
                        Ok(ChannelEvent::Value { .. }) => continue,
                        Ok(ChannelEvent::Terminated(reason)) => {
                            return Some((Err(ResolverError::RemoteFetchFailed(reason)), None));
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream::iter(initial).chain(updates).boxed())
    }
}
