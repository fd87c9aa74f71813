//! リトライポリシー
//!
//! 回数上限付きのリトライ実行器。待機は固定間隔（デフォルト）または指数バックオフ。
//! 上限に達した場合は最後の失敗をそのまま返す。

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// 試行間の待機方式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// 固定間隔
    Fixed,
    /// 指数バックオフ（`delay * factor^(n-1)`、`max_delay`で頭打ち）
    Exponential {
        /// 倍率
        factor: f64,
        /// 待機時間の上限
        max_delay: Duration,
    },
}

/// リトライポリシー
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff: Backoff,
}

impl RetryPolicy {
    /// 固定間隔のポリシーを作成
    ///
    /// `max_attempts`が0の場合は1回として扱う。
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// 指数バックオフのポリシーを作成
    pub fn exponential(max_attempts: u32, delay: Duration, factor: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: Backoff::Exponential { factor, max_delay },
        }
    }

    /// 最大試行回数
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `attempt`回目（1始まり）の失敗後に待機する時間
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { factor, max_delay } => {
                let exponent = attempt.saturating_sub(1) as i32;
                let scaled = self.delay.as_secs_f64() * factor.max(1.0).powi(exponent);
                Duration::from_secs_f64(scaled.min(max_delay.as_secs_f64()))
            }
        }
    }

    /// アクションを実行し、失敗したら上限までリトライする
    pub async fn run<T, E, F, Fut>(&self, mut action: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match action(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= self.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Retry attempts exhausted"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    debug!(
                        "Retry {}/{} after {}ms: {}",
                        attempt,
                        self.max_attempts,
                        delay.as_millis(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(2, Duration::from_millis(1500))
    }
}
