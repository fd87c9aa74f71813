//! ライブ更新リスナー（エンドポイント移行）の統合テスト

use crate::support::{
    record_changes, settle, test_config, CountingStorage, ScriptedChannel, StubProbe, STORAGE_KEY,
};
use endpoint_resolver::{CandidateSource, Resolver};
use std::sync::Arc;
use std::time::Duration;

const U1: &str = "https://u1.example.com/api/";
const U2: &str = "https://u2.example.com/api/";
const U3: &str = "https://u3.example.com/api/";

struct Harness {
    storage: CountingStorage,
    channel: ScriptedChannel,
    resolver: Resolver,
}

fn harness(storage: CountingStorage, channel: ScriptedChannel) -> Harness {
    let resolver = Resolver::builder(test_config())
        .storage(Arc::new(storage.clone()))
        .channel(Arc::new(channel.clone()))
        .probe(Arc::new(StubProbe::new(true)))
        .build()
        .unwrap();
    Harness {
        storage,
        channel,
        resolver,
    }
}

#[tokio::test(start_paused = true)]
async fn migration_notifies_exactly_once() {
    let h = harness(
        CountingStorage::new(),
        ScriptedChannel::new(vec![Ok(Some(U1.to_string()))]),
    );
    h.channel.live.publish("api_url", U1);

    assert_eq!(h.resolver.resolve().await.unwrap(), U1);
    settle().await;
    assert!(h.resolver.is_listening());

    let (changes, _subscription) = record_changes(&h.resolver);

    h.channel.live.publish("api_url", U2);
    settle().await;

    {
        let changes = changes.lock().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].previous.as_deref(), Some(U1));
        assert_eq!(changes[0].current.url, U2);
        assert_eq!(changes[0].source, CandidateSource::RemoteListener);
    }
    assert_eq!(h.storage.writes(), 2);
    assert_eq!(h.storage.stored().await.as_deref(), Some(U2));
    assert_eq!(h.resolver.current_url().as_deref(), Some(U2));

    // 現在値と同じ値の配信は通知しない
    h.channel.live.publish("api_url", U2);
    settle().await;

    assert_eq!(changes.lock().unwrap().len(), 1);
    assert_eq!(h.storage.writes(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_cache_is_corrected_by_listener() {
    let h = harness(
        CountingStorage::with_entry(STORAGE_KEY, U1),
        ScriptedChannel::failing(),
    );
    h.channel.live.publish("api_url", U2);
    let mut events = h.resolver.subscribe_events();

    // キャッシュ値で即座に解決される
    assert_eq!(h.resolver.resolve().await.unwrap(), U1);
    assert_eq!(h.channel.fetches(), 0);

    let first = events.recv().await.unwrap();
    assert_eq!(first.source, CandidateSource::Cache);

    let migrated = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(migrated.previous.as_deref(), Some(U1));
    assert_eq!(migrated.current.url, U2);
    assert_eq!(h.storage.stored().await.as_deref(), Some(U2));
}

#[tokio::test(start_paused = true)]
async fn invalid_live_values_are_ignored() {
    let h = harness(
        CountingStorage::with_entry(STORAGE_KEY, U1),
        ScriptedChannel::failing(),
    );
    h.resolver.resolve().await.unwrap();
    settle().await;
    let (changes, _subscription) = record_changes(&h.resolver);

    h.channel.live.publish("api_url", "javascript:alert(1)");
    h.channel.live.remove("api_url");
    settle().await;

    assert!(changes.lock().unwrap().is_empty());
    assert_eq!(h.resolver.current_url().as_deref(), Some(U1));
    assert_eq!(h.storage.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn listener_resubscribes_after_stream_failure() {
    let h = harness(
        CountingStorage::with_entry(STORAGE_KEY, U1),
        ScriptedChannel::failing(),
    );
    h.resolver.resolve().await.unwrap();
    settle().await;
    assert_eq!(h.channel.live.subscribe_count(), 1);

    h.channel.live.terminate_subscribers("connection reset");
    settle().await;
    assert_eq!(h.channel.live.subscriber_count(), 0);

    // 再購読待機（デフォルト3秒）の経過後
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(h.channel.live.subscribe_count(), 2);
    assert_eq!(h.channel.live.subscriber_count(), 1);

    h.channel.live.publish("api_url", U3);
    settle().await;
    assert_eq!(h.resolver.current_url().as_deref(), Some(U3));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_listener() {
    let h = harness(
        CountingStorage::with_entry(STORAGE_KEY, U1),
        ScriptedChannel::failing(),
    );
    h.resolver.resolve().await.unwrap();
    settle().await;
    assert!(h.resolver.is_listening());

    h.resolver.shutdown();
    settle().await;

    assert!(!h.resolver.is_listening());
    assert_eq!(h.channel.live.subscriber_count(), 0);

    h.channel.live.publish("api_url", U2);
    settle().await;
    assert_eq!(h.resolver.current_url().as_deref(), Some(U1));
}

#[tokio::test(start_paused = true)]
async fn dropping_resolver_releases_subscription() {
    let h = harness(
        CountingStorage::with_entry(STORAGE_KEY, U1),
        ScriptedChannel::failing(),
    );
    h.resolver.resolve().await.unwrap();
    settle().await;
    assert_eq!(h.channel.live.subscriber_count(), 1);

    let channel = h.channel.clone();
    drop(h);
    settle().await;

    assert_eq!(channel.live.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_callback_handle_stops_notifications() {
    let h = harness(
        CountingStorage::with_entry(STORAGE_KEY, U1),
        ScriptedChannel::failing(),
    );
    h.resolver.resolve().await.unwrap();
    settle().await;

    let (changes, subscription) = record_changes(&h.resolver);
    subscription.unsubscribe();

    h.channel.live.publish("api_url", U2);
    settle().await;

    assert_eq!(h.resolver.current_url().as_deref(), Some(U2));
    assert!(changes.lock().unwrap().is_empty());
}
