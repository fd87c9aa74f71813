//! 統合テスト用のテストダブル

#![allow(dead_code)]

use async_trait::async_trait;
use endpoint_resolver::cache::{KeyValueStorage, MemoryStorage};
use endpoint_resolver::events::ChangeSubscription;
use endpoint_resolver::probe::LivenessProbe;
use endpoint_resolver::remote::{LiveUpdates, MemoryChannel, RemoteConfigChannel};
use endpoint_resolver_common::config::ResolverConfig;
use endpoint_resolver::Resolver;
use endpoint_resolver_common::{EndpointChange, ResolverError, ResolverResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const STORAGE_KEY: &str = "@api_url";
pub const REMOTE_KEY: &str = "api_url";

/// テスト用の設定（デフォルト値のまま）
pub fn test_config() -> ResolverConfig {
    ResolverConfig::default()
}

/// 実時間で動くテスト向けに待機時間を短くした設定
pub fn fast_config() -> ResolverConfig {
    ResolverConfig {
        fetch_retry_delay_ms: 10,
        fetch_timeout_ms: 1000,
        live_update_timeout_ms: 300,
        probe_timeout_ms: 500,
        resubscribe_delay_ms: 50,
        ..ResolverConfig::default()
    }
}

/// 書き込み回数を数えるストレージ
#[derive(Clone, Default)]
pub struct CountingStorage {
    inner: MemoryStorage,
    writes: Arc<AtomicUsize>,
    read_delay: Arc<Mutex<Duration>>,
}

impl CountingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        Self {
            inner: MemoryStorage::with_entry(key, value),
            ..Self::default()
        }
    }

    /// 以降の読み込みを遅延させる（書き込みは遅延しない）
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = delay;
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn stored(&self) -> Option<String> {
        self.inner.get(STORAGE_KEY).await.unwrap()
    }
}

#[async_trait]
impl KeyValueStorage for CountingStorage {
    async fn get(&self, key: &str) -> ResolverResult<Option<String>> {
        // 読み込み時点の値を返してから遅延させ、遅いディスクを模す
        let value = self.inner.get(key).await;
        let delay = *self.read_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        value
    }

    async fn set(&self, key: &str, value: &str) -> ResolverResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }
}

/// 常に失敗するストレージ
pub struct FailingStorage;

#[async_trait]
impl KeyValueStorage for FailingStorage {
    async fn get(&self, _key: &str) -> ResolverResult<Option<String>> {
        Err(ResolverError::CacheUnavailable("disk offline".into()))
    }

    async fn set(&self, _key: &str, _value: &str) -> ResolverResult<()> {
        Err(ResolverError::CacheUnavailable("disk offline".into()))
    }
}

/// 単発取得の応答を順番に返すチャネル
///
/// スクリプトが尽きた後の単発取得は失敗する。購読は内部の`MemoryChannel`に委譲する。
#[derive(Clone)]
pub struct ScriptedChannel {
    script: Arc<Mutex<VecDeque<ResolverResult<Option<String>>>>>,
    fetch_delay: Duration,
    fetches: Arc<AtomicUsize>,
    pub live: MemoryChannel,
}

impl ScriptedChannel {
    pub fn new(script: Vec<ResolverResult<Option<String>>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            fetch_delay: Duration::ZERO,
            fetches: Arc::new(AtomicUsize::new(0)),
            live: MemoryChannel::new(),
        }
    }

    /// 常に失敗するチャネル
    pub fn failing() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteConfigChannel for ScriptedChannel {
    async fn get(&self, _key: &str) -> ResolverResult<Option<String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ResolverError::RemoteFetchFailed("network down".into())))
    }

    async fn subscribe(&self, key: &str) -> ResolverResult<LiveUpdates> {
        self.live.subscribe(key).await
    }
}

/// 結果を切り替えられる生存確認
#[derive(Clone)]
pub struct StubProbe {
    reachable: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl StubProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: Arc::new(AtomicBool::new(reachable)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for StubProbe {
    async fn probe(&self, _url: &str, _timeout: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }
}

/// 他のタスクに実行機会を与える
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// 変更通知を記録する（ハンドルをdropすると記録が止まる）
pub fn record_changes(resolver: &Resolver) -> (Arc<Mutex<Vec<EndpointChange>>>, ChangeSubscription) {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = changes.clone();
    let subscription = resolver.on_change(move |change| {
        sink.lock().unwrap().push(change.clone());
    });
    (changes, subscription)
}
