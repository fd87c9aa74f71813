//! Realtime Database互換のリモート設定チャネル
//!
//! REST API でキーを読み出し、Server-Sent Events でライブ更新を受け取る。
//!
//! - 単発取得: `GET {base}/{key}.json` → JSON値（文字列のみURL候補）
//! - ライブ更新: 同じURLに`Accept: text/event-stream`
//!   - `put` (`path == "/"`): 新しい値
//!   - `keep-alive`: 無視
//!   - `cancel` / `auth_revoked`: 終端エラー

use super::{LiveUpdates, RemoteConfigChannel};
use async_trait::async_trait;
use endpoint_resolver_common::url::is_valid_url;
use endpoint_resolver_common::{ResolverError, ResolverResult};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Realtime Database互換チャネル
#[derive(Clone)]
pub struct RtdbChannel {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl RtdbChannel {
    /// データベースURLを指定して作成
    pub fn new(base_url: &str, auth_token: Option<String>) -> ResolverResult<Self> {
        Self::with_client(Client::new(), base_url, auth_token)
    }

    /// 共有HTTPクライアントを使って作成
    pub fn with_client(
        client: Client,
        base_url: &str,
        auth_token: Option<String>,
    ) -> ResolverResult<Self> {
        if !is_valid_url(base_url) {
            return Err(ResolverError::Config(format!(
                "invalid remote config URL: {}",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    /// キーに対応するREST URL
    pub fn key_url(&self, key: &str) -> String {
        format!("{}/{}.json", self.base_url, key.trim_matches('/'))
    }

    fn request(&self, key: &str) -> RequestBuilder {
        let request = self.client.get(self.key_url(key));
        match self.auth_token {
            Some(ref token) => request.query(&[("auth", token.as_str())]),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteConfigChannel for RtdbChannel {
    async fn get(&self, key: &str) -> ResolverResult<Option<String>> {
        let response = self
            .request(key)
            .send()
            .await
            .map_err(|e| ResolverError::RemoteFetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolverError::RemoteFetchFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ResolverError::RemoteFetchFailed(format!("invalid JSON: {}", e)))?;

        match body {
            Value::String(value) => Ok(Some(value)),
            Value::Null => Ok(None),
            other => Err(ResolverError::RemoteFetchFailed(format!(
                "unexpected payload type: {}",
                json_type_name(&other)
            ))),
        }
    }

    async fn subscribe(&self, key: &str) -> ResolverResult<LiveUpdates> {
        let response = self
            .request(key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ResolverError::RemoteFetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolverError::RemoteFetchFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        debug!(url = %self.key_url(key), "Live update stream opened");

        let state = StreamState {
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            parser: SseParser::default(),
            pending: VecDeque::new(),
            finished: false,
        };

        let updates = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    if item.is_err() {
                        state.finished = true;
                        state.pending.clear();
                    }
                    return Some((item, state));
                }
                if state.finished {
                    return None;
                }

                match state.body.next().await {
                    Some(Ok(chunk)) => match state.parser.push(&chunk) {
                        Ok(events) => {
                            for event in events {
                                if let Some(item) = interpret_event(&event) {
                                    state.pending.push_back(item);
                                }
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Dropping oversized live update event");
                            state.pending.push_back(Err(e));
                        }
                    },
                    Some(Err(e)) => {
                        state
                            .pending
                            .push_back(Err(ResolverError::RemoteFetchFailed(e.to_string())));
                    }
                    None => {
                        debug!("Live update stream closed by server");
                        return None;
                    }
                }
            }
        });

        Ok(updates.boxed())
    }
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    parser: SseParser,
    pending: VecDeque<ResolverResult<Option<String>>>,
    finished: bool,
}

/// SSEイベント
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

/// 1イベントあたりの最大バイト数（区切りの空行を含まない）
const MAX_EVENT_BYTES: usize = 64 * 1024;

/// SSEのバイト列をイベント単位に分割する
#[derive(Debug, Default)]
struct SseParser {
    buffer: Vec<u8>,
    /// 区切りが無いことを確認済みの先頭バイト数
    scanned: usize,
}

impl SseParser {
    fn push(&mut self, chunk: &[u8]) -> ResolverResult<Vec<SseEvent>> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        loop {
            // 直前のチャンク末尾の改行と新しいチャンク先頭の改行の組も拾う
            let start = self.scanned.saturating_sub(1);
            let Some(pos) = find_subsequence(&self.buffer[start..], b"\n\n") else {
                break;
            };
            let block: Vec<u8> = self.buffer.drain(..start + pos + 2).collect();
            self.scanned = 0;
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        self.scanned = self.buffer.len();

        if self.buffer.len() > MAX_EVENT_BYTES {
            self.buffer.clear();
            self.scanned = 0;
            return Err(ResolverError::RemoteFetchFailed(format!(
                "event exceeds {} bytes without a terminating blank line",
                MAX_EVENT_BYTES
            )));
        }
        Ok(events)
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = String::from("message");
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data.is_empty() && event == "message" {
        return None;
    }

    Some(SseEvent {
        event,
        data: data.join("\n"),
    })
}

#[derive(Debug, Deserialize)]
struct PutPayload {
    path: String,
    data: Value,
}

/// SSEイベントをライブ更新に変換する（無視するイベントはNone）
fn interpret_event(event: &SseEvent) -> Option<ResolverResult<Option<String>>> {
    match event.event.as_str() {
        "put" => {
            let payload: PutPayload = match serde_json::from_str(&event.data) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Malformed put event");
                    return None;
                }
            };
            if payload.path != "/" {
                debug!(path = %payload.path, "Ignoring nested put event");
                return None;
            }
            match payload.data {
                Value::String(value) => Some(Ok(Some(value))),
                Value::Null => Some(Ok(None)),
                other => {
                    warn!(
                        payload_type = json_type_name(&other),
                        "Ignoring non-string config value"
                    );
                    Some(Ok(None))
                }
            }
        }
        "keep-alive" | "patch" => None,
        "cancel" => Some(Err(ResolverError::RemoteFetchFailed(format!(
            "subscription cancelled: {}",
            event.data
        )))),
        "auth_revoked" => Some(Err(ResolverError::RemoteFetchFailed(
            "subscription auth revoked".into(),
        ))),
        other => {
            debug!(event = other, "Ignoring unknown event");
            None
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
