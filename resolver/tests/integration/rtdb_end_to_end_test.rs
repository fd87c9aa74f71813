//! RTDB互換ストア + ファイルキャッシュ + HTTP生存確認のエンドツーエンドテスト

use crate::support::{fast_config, ScriptedChannel, StubProbe};
use endpoint_resolver::cache::FileStorage;
use endpoint_resolver::remote::RtdbChannel;
use endpoint_resolver::{CandidateSource, Resolver};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn fetch_probe_and_persist_across_restart() {
    let mock = MockServer::start().await;
    let backend = format!("{}/backend/", mock.uri());
    Mock::given(method("GET"))
        .and(path("/api_url.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(backend)))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/backend/ping/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .expect(2)
        .mount(&mock)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = fast_config();
    config.remote_url = mock.uri();
    config.storage_path = dir.path().join("cache").join("endpoint.json");

    let resolver = Resolver::builder(config.clone())
        .live_listener(false)
        .build()
        .unwrap();

    assert_eq!(resolver.resolve().await.unwrap(), backend);
    assert!(resolver.current().unwrap().last_verified_reachable);
    assert!(resolver.check_network().await);

    let persisted: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config.storage_path).unwrap()).unwrap();
    assert_eq!(persisted["@api_url"], json!(backend));

    // 再起動後はネットワークに触れずキャッシュから解決される
    let offline = ScriptedChannel::failing();
    let restarted = Resolver::builder(config.clone())
        .storage(Arc::new(FileStorage::new(config.storage_path.clone())))
        .channel(Arc::new(offline.clone()))
        .probe(Arc::new(StubProbe::new(false)))
        .live_listener(false)
        .build()
        .unwrap();

    assert_eq!(restarted.resolve().await.unwrap(), backend);
    assert_eq!(offline.fetches(), 0);
}

#[tokio::test]
async fn falls_back_to_event_stream_when_fetch_fails() {
    let mock = MockServer::start().await;
    let body = concat!(
        "event: put\n",
        "data: {\"path\":\"/\",\"data\":\"not a url\"}\n\n",
        "event: put\n",
        "data: {\"path\":\"/\",\"data\":\"https://live.example.com/api/\"}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/api_url.json"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .with_priority(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/api_url.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = fast_config();
    config.storage_path = dir.path().join("endpoint.json");

    let channel = RtdbChannel::new(&mock.uri(), None).unwrap();
    let resolver = Resolver::builder(config.clone())
        .channel(Arc::new(channel))
        .probe(Arc::new(StubProbe::new(false)))
        .live_listener(false)
        .build()
        .unwrap();
    let mut events = resolver.subscribe_events();

    assert_eq!(
        resolver.resolve().await.unwrap(),
        "https://live.example.com/api/"
    );

    let change = events.recv().await.unwrap();
    assert_eq!(change.source, CandidateSource::RemoteListener);

    let storage = FileStorage::new(config.storage_path.clone());
    assert_eq!(
        endpoint_resolver::cache::KeyValueStorage::get(&storage, "@api_url")
            .await
            .unwrap()
            .as_deref(),
        Some("https://live.example.com/api/")
    );
}
