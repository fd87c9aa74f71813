//! 生存確認プローブ
//!
//! 候補URLに`GET <base>/ping/`を送り、時間内に2xxが返れば到達可能とみなす。
//! 結果は常に参考情報であり、失敗しても候補の受理を妨げない。

use async_trait::async_trait;
use endpoint_resolver_common::url::join_endpoint;
use endpoint_resolver_common::ResolverError;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 生存確認のパス
pub const PING_PATH: &str = "ping/";

/// 生存確認
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// URLが`timeout`以内に応答するか確認する（エラーは返さない）
    async fn probe(&self, url: &str, timeout: Duration) -> bool;
}

/// HTTPによる生存確認
#[derive(Clone, Default)]
pub struct HttpLivenessProber {
    client: Client,
}

impl HttpLivenessProber {
    /// 新しいプローバーを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 共有HTTPクライアントを使って作成
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn try_ping(&self, url: &str, timeout: Duration) -> Result<(), ResolverError> {
        let ping_url = join_endpoint(url, PING_PATH)?;

        let response = self
            .client
            .get(&ping_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResolverError::ProbeFailed(format!("timed out after {}ms", timeout.as_millis()))
                } else {
                    ResolverError::ProbeFailed(e.to_string())
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ResolverError::ProbeFailed(format!("HTTP {}", response.status())))
        }
    }
}

#[async_trait]
impl LivenessProbe for HttpLivenessProber {
    async fn probe(&self, url: &str, timeout: Duration) -> bool {
        let start = Instant::now();

        match self.try_ping(url, timeout).await {
            Ok(()) => {
                debug!(
                    url = %url,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Liveness probe succeeded"
                );
                true
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Liveness probe failed");
                false
            }
        }
    }
}
