//! エンドポイントリゾルバー
//!
//! 探索順: ローカルキャッシュ → リモート単発取得（リトライ付き） → ライブ更新待機（タイムアウト付き）
//!
//! - 解決処理は同時に1つだけ実行され、重複した`resolve()`は実行中の結果を共有する
//! - 現在値の書き込みは単一のライターロックで直列化される
//! - 初回解決後はライブ更新リスナーが常駐し、エンドポイントの移行を反映する
//! - 生存確認は参考情報であり、候補の受理を妨げない

use crate::cache::{FileStorage, KeyValueStorage, LocalCache};
use crate::events::{ChangeNotifier, ChangeSubscription};
use crate::probe::{HttpLivenessProber, LivenessProbe};
use crate::remote::{RemoteConfigChannel, RtdbChannel};
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownController;
use endpoint_resolver_common::config::ResolverConfig;
use endpoint_resolver_common::url::{is_valid_url, join_endpoint};
use endpoint_resolver_common::{
    CandidateSource, EndpointCandidate, EndpointChange, ResolvedEndpoint, ResolverError,
    ResolverResult,
};
use futures::future::{BoxFuture, Shared};
use futures::{FutureExt, StreamExt};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type SharedResolution = Shared<BoxFuture<'static, ResolverResult<String>>>;

/// 解決処理の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    /// 未実行
    Idle,
    /// キャッシュ確認中
    CheckingCache,
    /// リモート単発取得中（試行回数）
    FetchingRemote {
        /// 試行回数（1始まり）
        attempt: u32,
    },
    /// ライブ更新待機中
    AwaitingLiveUpdate,
    /// 解決済み
    Resolved,
    /// 解決失敗
    Failed,
}

impl ResolverState {
    /// ログ出力用の文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolverState::Idle => "idle",
            ResolverState::CheckingCache => "checking_cache",
            ResolverState::FetchingRemote { .. } => "fetching_remote",
            ResolverState::AwaitingLiveUpdate => "awaiting_live_update",
            ResolverState::Resolved => "resolved",
            ResolverState::Failed => "failed",
        }
    }
}

/// リゾルバーのビルダー
pub struct ResolverBuilder {
    config: ResolverConfig,
    storage: Option<Arc<dyn KeyValueStorage>>,
    channel: Option<Arc<dyn RemoteConfigChannel>>,
    probe: Option<Arc<dyn LivenessProbe>>,
    retry: Option<RetryPolicy>,
    live_listener: bool,
}

impl ResolverBuilder {
    /// 永続ストレージを指定（デフォルト: `config.storage_path`のファイル）
    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// リモート設定チャネルを指定（デフォルト: `config.remote_url`のRTDB互換ストア）
    pub fn channel(mut self, channel: Arc<dyn RemoteConfigChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// 生存確認を指定（デフォルト: HTTP）
    pub fn probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// リトライポリシーを指定（デフォルト: 設定値による固定間隔）
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// 初回解決後にライブ更新リスナーを常駐させるか（デフォルト: true）
    pub fn live_listener(mut self, enabled: bool) -> Self {
        self.live_listener = enabled;
        self
    }

    /// リゾルバーを作成
    pub fn build(self) -> ResolverResult<Resolver> {
        self.config.validate()?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => Arc::new(FileStorage::new(self.config.storage_path.clone())),
        };

        let channel = match self.channel {
            Some(channel) => channel,
            None => {
                if self.config.remote_url.is_empty() {
                    return Err(ResolverError::Config(
                        "remote_url is required when no channel is provided".into(),
                    ));
                }
                Arc::new(RtdbChannel::new(
                    &self.config.remote_url,
                    self.config.remote_auth_token.clone(),
                )?)
            }
        };

        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(HttpLivenessProber::new()));

        let retry = self.retry.unwrap_or_else(|| {
            RetryPolicy::fixed(self.config.fetch_attempts, self.config.fetch_retry_delay())
        });

        let cache = LocalCache::new(storage, self.config.storage_key.clone());

        Ok(Resolver {
            inner: Arc::new(Inner {
                config: self.config,
                cache,
                channel,
                probe,
                retry,
                live_listener: self.live_listener,
                current: RwLock::new(None),
                state: RwLock::new(ResolverState::Idle),
                writer: tokio::sync::Mutex::new(()),
                notifier: ChangeNotifier::new(),
                in_flight: tokio::sync::Mutex::new(None),
                listener: Mutex::new(None),
                shutdown: ShutdownController::default(),
            }),
        })
    }
}

/// エンドポイントリゾルバー
///
/// `Clone`は同じ状態を共有するハンドルを返す。
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

struct Inner {
    config: ResolverConfig,
    cache: LocalCache,
    channel: Arc<dyn RemoteConfigChannel>,
    probe: Arc<dyn LivenessProbe>,
    retry: RetryPolicy,
    live_listener: bool,
    /// 現在の解決済みエンドポイント（書き込みは`writer`保持中のみ）
    current: RwLock<Option<ResolvedEndpoint>>,
    state: RwLock<ResolverState>,
    writer: tokio::sync::Mutex<()>,
    notifier: ChangeNotifier,
    in_flight: tokio::sync::Mutex<Option<SharedResolution>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    shutdown: ShutdownController,
}

impl Resolver {
    /// ビルダーを作成
    pub fn builder(config: ResolverConfig) -> ResolverBuilder {
        ResolverBuilder {
            config,
            storage: None,
            channel: None,
            probe: None,
            retry: None,
            live_listener: true,
        }
    }

    /// 設定からデフォルトの構成で作成
    pub fn from_config(config: ResolverConfig) -> ResolverResult<Self> {
        Self::builder(config).build()
    }

    /// エンドポイントを解決する
    ///
    /// 実行中の解決処理があればその結果を待つ。全戦略が尽きた場合は
    /// `EndpointUnresolved`を返し、キャッシュと現在値は変更しない。
    pub async fn resolve(&self) -> ResolverResult<String> {
        let resolution = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight endpoint resolution");
                    existing.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    // 呼び出し元がキャンセルされても解決処理は最後まで実行する
                    let handle = tokio::spawn(async move {
                        let result = inner.discover().await;
                        *inner.in_flight.lock().await = None;
                        result
                    });
                    let resolution = async move {
                        handle.await.unwrap_or_else(|e| {
                            Err(ResolverError::Internal(format!(
                                "resolution task failed: {}",
                                e
                            )))
                        })
                    }
                    .boxed()
                    .shared();
                    *in_flight = Some(resolution.clone());
                    resolution
                }
            }
        };

        resolution.await
    }

    /// 現在の解決済みエンドポイント（ノンブロッキング）
    pub fn current(&self) -> Option<ResolvedEndpoint> {
        self.inner.current_endpoint()
    }

    /// 現在のURL（ノンブロッキング）
    pub fn current_url(&self) -> Option<String> {
        self.inner.current_url()
    }

    /// 解決処理の状態
    pub fn state(&self) -> ResolverState {
        self.inner.state()
    }

    /// URL変更時のコールバックを登録
    ///
    /// 返されたハンドルをdropすると登録が解除される。
    pub fn on_change<F>(&self, callback: F) -> ChangeSubscription
    where
        F: Fn(&EndpointChange) + Send + Sync + 'static,
    {
        self.inner.notifier.on_change(callback)
    }

    /// 変更イベントを購読
    pub fn subscribe_events(&self) -> broadcast::Receiver<EndpointChange> {
        self.inner.notifier.subscribe()
    }

    /// 現在のエンドポイントの生存確認
    ///
    /// 未解決の場合はfalse。
    pub async fn check_network(&self) -> bool {
        let Some(url) = self.current_url() else {
            debug!("check_network called before resolution");
            return false;
        };

        let reachable = self
            .inner
            .probe
            .probe(&url, self.inner.config.probe_timeout())
            .await;
        self.inner.record_reachability(&url, reachable).await;
        reachable
    }

    /// URLを手動で設定する
    ///
    /// 現在値と同じ場合は`Ok(false)`、不正なURLは`InvalidUrl`。
    pub async fn set_url(&self, url: &str) -> ResolverResult<bool> {
        if !is_valid_url(url) {
            return Err(ResolverError::InvalidUrl(url.to_string()));
        }

        let candidate = EndpointCandidate::new(url, CandidateSource::Manual);
        let changed = self.inner.accept(candidate, false, false).await;
        self.inner.set_state(ResolverState::Resolved);
        if changed {
            self.inner.spawn_advisory_probe(url.to_string());
        }
        Ok(changed)
    }

    /// 現在のベースURLにパスを連結したURLを返す
    ///
    /// 未解決の場合は`EndpointUnresolved`。業務リクエストは未解決のURLで送信してはならない。
    pub fn endpoint(&self, path: &str) -> ResolverResult<String> {
        let base = self
            .current_url()
            .ok_or_else(|| ResolverError::EndpointUnresolved("no endpoint resolved".into()))?;
        join_endpoint(&base, path)
    }

    /// ライブ更新リスナーが動作中か
    pub fn is_listening(&self) -> bool {
        self.inner
            .listener
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    /// ライブ更新リスナーを停止する
    pub fn shutdown(&self) {
        info!("Shutting down endpoint resolver");
        self.inner.shutdown.request_shutdown();
        if let Ok(mut slot) = self.inner.listener.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }

    /// 設定
    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }
}

impl Inner {
    fn current_endpoint(&self) -> Option<ResolvedEndpoint> {
        self.current.read().ok().and_then(|current| current.clone())
    }

    fn current_url(&self) -> Option<String> {
        self.current
            .read()
            .ok()
            .and_then(|current| current.as_ref().map(|c| c.url.clone()))
    }

    fn state(&self) -> ResolverState {
        self.state
            .read()
            .map(|state| *state)
            .unwrap_or(ResolverState::Idle)
    }

    fn set_state(&self, next: ResolverState) {
        if let Ok(mut state) = self.state.write() {
            if *state != next {
                debug!(from = state.as_str(), to = next.as_str(), "Resolver state changed");
            }
            *state = next;
        }
    }

    /// 探索処理本体
    async fn discover(self: &Arc<Self>) -> ResolverResult<String> {
        self.set_state(ResolverState::CheckingCache);

        match self.cache.read().await {
            Ok(Some(cached)) => {
                let url = self.accept_cached(cached).await;
                self.set_state(ResolverState::Resolved);
                info!(url = %url, source = "cache", "Endpoint resolved");
                // 生存確認は起動を遅らせないよう非同期で行う
                self.spawn_advisory_probe(url.clone());
                self.ensure_listener();
                return Ok(url);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    error = %e,
                    error_kind = e.kind(),
                    "Local cache unavailable, treating as miss"
                );
            }
        }

        let fetch_error = match self.fetch_with_retry().await {
            Ok(url) => {
                self.accept_remote(url.clone(), CandidateSource::RemoteFetch)
                    .await;
                return Ok(url);
            }
            Err(e) => e,
        };

        warn!(
            error = %fetch_error,
            error_kind = fetch_error.kind(),
            timeout_ms = self.config.live_update_timeout_ms,
            "Remote fetch exhausted, waiting for live update"
        );
        self.set_state(ResolverState::AwaitingLiveUpdate);

        match self.await_live_update().await {
            Ok(url) => {
                self.accept_remote(url.clone(), CandidateSource::RemoteListener)
                    .await;
                Ok(url)
            }
            Err(live_error) => {
                // 探索中に手動設定などで現在値が確定していればそれを結果とする
                if let Some(url) = self.current_url() {
                    info!(
                        url = %url,
                        error_kind = live_error.kind(),
                        "Discovery exhausted but an endpoint became current meanwhile"
                    );
                    self.set_state(ResolverState::Resolved);
                    self.ensure_listener();
                    return Ok(url);
                }

                self.set_state(ResolverState::Failed);
                let reason = format!(
                    "cache miss; remote fetch failed ({}); live update failed ({})",
                    fetch_error, live_error
                );
                warn!(
                    reason = %reason,
                    error_kind = live_error.kind(),
                    "Endpoint resolution failed"
                );
                Err(ResolverError::EndpointUnresolved(reason))
            }
        }
    }

    /// リモート由来の候補を受理する（生存確認 → 書き戻し → 通知）
    async fn accept_remote(self: &Arc<Self>, url: String, source: CandidateSource) {
        let reachable = self.probe_advisory(&url).await;
        let candidate = EndpointCandidate::new(url.clone(), source);
        self.accept(candidate, reachable, true).await;
        self.set_state(ResolverState::Resolved);
        info!(url = %url, source = %source, reachable, "Endpoint resolved");
        self.ensure_listener();
    }

    /// リトライ付き単発取得
    async fn fetch_with_retry(&self) -> ResolverResult<String> {
        self.retry
            .run(move |attempt| async move {
                self.set_state(ResolverState::FetchingRemote { attempt });
                self.fetch_once().await
            })
            .await
    }

    /// 単発取得（1回分）。空値・不正値も失敗として扱う
    async fn fetch_once(&self) -> ResolverResult<String> {
        let key = &self.config.remote_key;
        let timeout = self.config.fetch_timeout();

        let value = match tokio::time::timeout(timeout, self.channel.get(key)).await {
            Ok(Ok(value)) => value,
            Ok(Err(ResolverError::RemoteFetchFailed(reason))) => {
                return Err(ResolverError::RemoteFetchFailed(reason))
            }
            Ok(Err(e)) => return Err(ResolverError::RemoteFetchFailed(e.to_string())),
            Err(_) => {
                return Err(ResolverError::RemoteFetchFailed(format!(
                    "timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        };

        match value {
            Some(url) if is_valid_url(&url) => Ok(url),
            Some(url) => Err(ResolverError::RemoteFetchFailed(format!(
                "invalid URL payload: {}",
                url
            ))),
            None => Err(ResolverError::RemoteFetchFailed(format!(
                "no value at key {}",
                key
            ))),
        }
    }

    /// ライブ更新の最初の有効値を待つ
    ///
    /// 戻る時点で購読ストリームはdropされ、リスナーは残らない。
    async fn await_live_update(&self) -> ResolverResult<String> {
        let key = &self.config.remote_key;
        let timeout = self.config.live_update_timeout();

        let wait = async {
            let mut updates = self.channel.subscribe(key).await?;
            while let Some(update) = updates.next().await {
                match update {
                    Ok(Some(url)) if is_valid_url(&url) => return Ok(url),
                    Ok(Some(url)) => {
                        debug!(value = %url, "Ignoring invalid live update");
                    }
                    Ok(None) => debug!("Ignoring empty live update"),
                    Err(e) => return Err(e),
                }
            }
            Err(ResolverError::RemoteFetchFailed(
                "live update stream closed".into(),
            ))
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(ResolverError::RemoteFetchFailed(format!(
                "no live update within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// 候補を受理し、URLが変わった場合のみ通知する
    ///
    /// `always_persist`がfalseの場合、キャッシュへの書き戻しはURLが変わった時のみ行う。
    /// 戻り値はURLが変わったかどうか。
    async fn accept(
        &self,
        candidate: EndpointCandidate,
        reachable: bool,
        always_persist: bool,
    ) -> bool {
        if !is_valid_url(&candidate.url) {
            warn!(url = %candidate.url, source = %candidate.source, "Rejecting invalid candidate");
            return false;
        }

        let _writer = self.writer.lock().await;

        let previous = self.current_url();
        let changed = previous.as_deref() != Some(candidate.url.as_str());
        let persist = candidate.source.requires_write_through() && (changed || always_persist);

        // 公開前にキャッシュへ書き込む（失敗しても受理は継続）
        if persist {
            if let Err(e) = self.cache.write(&candidate.url).await {
                warn!(url = %candidate.url, error = %e, "Failed to write endpoint cache");
            }
        }

        if changed {
            self.commit(candidate, reachable, previous);
        } else {
            self.set_current(ResolvedEndpoint::from_candidate(&candidate, reachable));
        }

        changed
    }

    /// 現在値を差し替えて変更を通知する（`writer`保持中に呼ぶこと）
    fn commit(&self, candidate: EndpointCandidate, reachable: bool, previous: Option<String>) {
        let resolved = ResolvedEndpoint::from_candidate(&candidate, reachable);
        self.set_current(resolved.clone());

        info!(
            previous = ?previous,
            current = %resolved.url,
            source = %candidate.source,
            "Endpoint changed"
        );
        self.notifier.publish(&EndpointChange {
            previous,
            current: resolved,
            source: candidate.source,
        });
    }

    fn set_current(&self, resolved: ResolvedEndpoint) {
        if let Ok(mut current) = self.current.write() {
            *current = Some(resolved);
        }
    }

    /// キャッシュの値を受理する
    ///
    /// キャッシュの読み込みはライターロックの外で行われるため、その間に
    /// ライブ更新や手動設定で現在値が確定していれば、そちらを優先して返す。
    /// キャッシュは受理のたびに現在値より先に書き込まれるので、現在値より新しくなることはない。
    async fn accept_cached(&self, cached: String) -> String {
        let _writer = self.writer.lock().await;

        if let Some(current) = self.current_url() {
            if current != cached {
                debug!(
                    cached = %cached,
                    current = %current,
                    "Cached endpoint is older than the current one, keeping current"
                );
            }
            return current;
        }

        // キャッシュ由来は書き戻し不要で、未設定からの遷移なので必ず通知する
        let candidate = EndpointCandidate::new(cached.clone(), CandidateSource::Cache);
        self.commit(candidate, false, None);
        cached
    }

    /// 生存確認（参考情報。失敗は劣化としてログに残す）
    async fn probe_advisory(&self, url: &str) -> bool {
        let reachable = self.probe.probe(url, self.config.probe_timeout()).await;
        if !reachable {
            warn!(url = %url, "Endpoint accepted but not reachable (degraded)");
        }
        reachable
    }

    fn spawn_advisory_probe(self: &Arc<Self>, url: String) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let reachable = inner.probe_advisory(&url).await;
            inner.record_reachability(&url, reachable).await;
        });
    }

    /// URLが現在値のままなら到達性を更新する（通知はしない）
    async fn record_reachability(&self, url: &str, reachable: bool) {
        let _writer = self.writer.lock().await;
        if let Ok(mut current) = self.current.write() {
            if let Some(endpoint) = current.as_mut().filter(|c| c.url == url) {
                endpoint.last_verified_reachable = reachable;
            }
        }
    }

    /// ライブ更新リスナーを起動する（起動済みなら何もしない）
    fn ensure_listener(self: &Arc<Self>) {
        if !self.live_listener || self.shutdown.is_shutdown_requested() {
            return;
        }

        let Ok(mut slot) = self.listener.lock() else {
            return;
        };
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let listener = LiveListener {
            inner: Arc::downgrade(self),
            channel: self.channel.clone(),
            key: self.config.remote_key.clone(),
            resubscribe_delay: self.config.resubscribe_delay(),
            shutdown: self.shutdown.clone(),
        };
        *slot = Some(tokio::spawn(listener.run()));
    }

    /// ライブ更新を処理する
    async fn handle_live_update(&self, url: String) {
        if !is_valid_url(&url) {
            debug!(value = %url, "Ignoring invalid live update");
            return;
        }
        if self.current_url().as_deref() == Some(url.as_str()) {
            debug!(url = %url, "Live update matches current endpoint");
            return;
        }

        let reachable = self.probe_advisory(&url).await;
        let candidate = EndpointCandidate::new(url, CandidateSource::RemoteListener);
        self.accept(candidate, reachable, false).await;
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// 常駐ライブ更新リスナー
///
/// リゾルバーへの参照は弱参照のみで、リゾルバー破棄時に自動的に終了する。
struct LiveListener {
    inner: Weak<Inner>,
    channel: Arc<dyn RemoteConfigChannel>,
    key: String,
    resubscribe_delay: Duration,
    shutdown: ShutdownController,
}

impl LiveListener {
    async fn run(self) {
        info!(key = %self.key, "Live update listener started");

        'listen: loop {
            if self.shutdown.is_shutdown_requested() || self.inner.strong_count() == 0 {
                break;
            }

            let subscribed = tokio::select! {
                _ = self.shutdown.wait() => break 'listen,
                result = self.channel.subscribe(&self.key) => result,
            };

            match subscribed {
                Ok(mut updates) => loop {
                    let next = tokio::select! {
                        _ = self.shutdown.wait() => break 'listen,
                        next = updates.next() => next,
                    };

                    match next {
                        Some(Ok(Some(url))) => {
                            let Some(inner) = self.inner.upgrade() else {
                                break 'listen;
                            };
                            inner.handle_live_update(url).await;
                        }
                        Some(Ok(None)) => debug!(key = %self.key, "Remote config value removed"),
                        Some(Err(e)) => {
                            warn!(key = %self.key, error = %e, "Live update stream failed");
                            break;
                        }
                        None => {
                            warn!(key = %self.key, "Live update stream ended");
                            break;
                        }
                    }
                },
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Failed to subscribe to live updates");
                }
            }

            debug!(
                delay_ms = self.resubscribe_delay.as_millis() as u64,
                "Resubscribing to live updates"
            );
            tokio::select! {
                _ = self.shutdown.wait() => break 'listen,
                _ = tokio::time::sleep(self.resubscribe_delay) => {}
            }
        }

        info!(key = %self.key, "Live update listener stopped");
    }
}
