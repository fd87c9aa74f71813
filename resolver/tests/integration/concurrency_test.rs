//! 同時解決とキャンセルの統合テスト

use crate::support::{
    record_changes, settle, test_config, CountingStorage, ScriptedChannel, StubProbe, STORAGE_KEY,
};
use endpoint_resolver::{CandidateSource, Resolver, ResolverState};
use std::sync::Arc;
use std::time::Duration;

const V: &str = "https://v.example.com/api/";
const U1: &str = "https://u1.example.com/api/";
const U2: &str = "https://u2.example.com/api/";
const U3: &str = "https://u3.example.com/api/";

fn resolver(storage: &CountingStorage, channel: &ScriptedChannel) -> Resolver {
    build(storage, channel, false)
}

fn build(storage: &CountingStorage, channel: &ScriptedChannel, live_listener: bool) -> Resolver {
    Resolver::builder(test_config())
        .storage(Arc::new(storage.clone()))
        .channel(Arc::new(channel.clone()))
        .probe(Arc::new(StubProbe::new(true)))
        .live_listener(live_listener)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn overlapping_resolves_share_one_discovery() {
    let storage = CountingStorage::new();
    let channel = ScriptedChannel::new(vec![Ok(Some(V.to_string()))])
        .with_fetch_delay(Duration::from_millis(100));
    let resolver = resolver(&storage, &channel);

    let (first, second) = tokio::join!(resolver.resolve(), resolver.resolve());

    assert_eq!(first.unwrap(), V);
    assert_eq!(second.unwrap(), V);
    assert_eq!(channel.fetches(), 1);
    assert_eq!(storage.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn cloned_handles_share_in_flight_resolution() {
    let storage = CountingStorage::new();
    let channel = ScriptedChannel::new(vec![Ok(Some(V.to_string()))])
        .with_fetch_delay(Duration::from_millis(100));
    let resolver = resolver(&storage, &channel);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve().await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), V);
    }
    assert_eq!(channel.fetches(), 1);
    assert_eq!(storage.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_caller_does_not_abort_discovery() {
    let storage = CountingStorage::new();
    let channel = ScriptedChannel::new(vec![Ok(Some(V.to_string()))])
        .with_fetch_delay(Duration::from_secs(1));
    let resolver = resolver(&storage, &channel);

    let caller = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.resolve().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    caller.abort();

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;

    assert_eq!(resolver.current_url().as_deref(), Some(V));
    assert_eq!(storage.stored().await.as_deref(), Some(V));

    // 完了済みのため次の解決はキャッシュから
    assert_eq!(resolver.resolve().await.unwrap(), V);
    assert_eq!(channel.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_resolution_can_be_retried() {
    let storage = CountingStorage::new();
    let channel = ScriptedChannel::failing();
    let resolver = resolver(&storage, &channel);

    assert!(resolver.resolve().await.is_err());

    channel.live.publish("api_url", V);
    assert_eq!(resolver.resolve().await.unwrap(), V);
    assert_eq!(channel.fetches(), 4);
}

#[tokio::test(start_paused = true)]
async fn slow_cache_read_does_not_revert_live_migration() {
    let storage = CountingStorage::with_entry(STORAGE_KEY, U1);
    let channel = ScriptedChannel::failing();
    let resolver = build(&storage, &channel, true);

    assert_eq!(resolver.resolve().await.unwrap(), U1);
    settle().await;
    assert!(resolver.is_listening());
    let (changes, _subscription) = record_changes(&resolver);

    // 2回目の解決がキャッシュ(U1)を読んでいる間に移行(U1 → U2)が届く
    storage.set_read_delay(Duration::from_millis(500));
    let second = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.resolve().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    channel.live.publish("api_url", U2);
    settle().await;
    assert_eq!(resolver.current_url().as_deref(), Some(U2));

    assert_eq!(second.await.unwrap().unwrap(), U2);
    settle().await;

    assert_eq!(resolver.current_url().as_deref(), Some(U2));
    assert_eq!(storage.stored().await.as_deref(), Some(U2));
    let changes = changes.lock().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].previous.as_deref(), Some(U1));
    assert_eq!(changes[0].current.url, U2);
}

#[tokio::test(start_paused = true)]
async fn manual_override_during_discovery_counts_as_resolved() {
    let storage = CountingStorage::new();
    let channel = ScriptedChannel::failing();
    let resolver = resolver(&storage, &channel);

    let discovery = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.resolve().await })
    };

    // 単発取得が尽き、ライブ更新を待っている間に手動設定する
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(resolver.state(), ResolverState::AwaitingLiveUpdate);
    assert!(resolver.set_url(U1).await.unwrap());

    assert_eq!(discovery.await.unwrap().unwrap(), U1);
    assert_eq!(resolver.state(), ResolverState::Resolved);
    assert_eq!(resolver.current_url().as_deref(), Some(U1));
    assert_eq!(storage.stored().await.as_deref(), Some(U1));
    assert_eq!(storage.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn listener_and_manual_override_interleave_consistently() {
    let storage = CountingStorage::with_entry(STORAGE_KEY, U1);
    let channel = ScriptedChannel::failing();
    let resolver = build(&storage, &channel, true);

    resolver.resolve().await.unwrap();
    settle().await;
    let (changes, _subscription) = record_changes(&resolver);

    let (manual, _) = tokio::join!(resolver.set_url(U2), async {
        channel.live.publish("api_url", U3);
        settle().await;
    });
    assert!(manual.unwrap());
    settle().await;

    // 通知は途切れずに連鎖し、最後の通知・現在値・キャッシュが一致する
    let changes = changes.lock().unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].previous.as_deref(), Some(U1));
    assert_eq!(changes[0].source, CandidateSource::Manual);
    for pair in changes.windows(2) {
        assert_eq!(pair[1].previous.as_deref(), Some(pair[0].current.url.as_str()));
    }
    let last = changes.last().unwrap().current.url.clone();
    assert_eq!(last, U3);
    assert_eq!(resolver.current_url(), Some(last.clone()));
    assert_eq!(storage.stored().await, Some(last));
}
