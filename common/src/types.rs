//! エンドポイントのデータモデル
//!
//! EndpointCandidate, ResolvedEndpoint, EndpointChange

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 候補URLの取得元
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// ローカルキャッシュ
    Cache,
    /// リモート設定の単発取得
    RemoteFetch,
    /// リモート設定のライブ更新
    RemoteListener,
    /// 手動設定
    Manual,
}

impl CandidateSource {
    /// ログ出力用の文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::Cache => "cache",
            CandidateSource::RemoteFetch => "remote_fetch",
            CandidateSource::RemoteListener => "remote_listener",
            CandidateSource::Manual => "manual",
        }
    }

    /// キャッシュへの書き戻しが必要な取得元か
    pub fn requires_write_through(&self) -> bool {
        !matches!(self, CandidateSource::Cache)
    }
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// エンドポイント候補
///
/// 生成後は変更せず、新しい候補が受理されたら置き換えられる。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointCandidate {
    /// 候補URL
    pub url: String,
    /// 取得元
    pub source: CandidateSource,
    /// 検証時刻
    pub validated_at: DateTime<Utc>,
}

impl EndpointCandidate {
    /// 現在時刻で候補を作成
    pub fn new(url: impl Into<String>, source: CandidateSource) -> Self {
        Self {
            url: url.into(),
            source,
            validated_at: Utc::now(),
        }
    }
}

/// 解決済みエンドポイント（プロセス内で唯一の現在値）
///
/// `url`は常にバリデータを通過した値。到達性は参考情報にすぎない。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// ベースURL
    pub url: String,
    /// 直近の生存確認が成功したか
    pub last_verified_reachable: bool,
    /// 更新時刻
    pub updated_at: DateTime<Utc>,
}

impl ResolvedEndpoint {
    /// 候補から解決済みエンドポイントを作成
    pub fn from_candidate(candidate: &EndpointCandidate, reachable: bool) -> Self {
        Self {
            url: candidate.url.clone(),
            last_verified_reachable: reachable,
            updated_at: Utc::now(),
        }
    }
}

/// エンドポイント変更通知
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EndpointChange {
    /// 変更前のURL（初回解決時はNone）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    /// 変更後のエンドポイント
    pub current: ResolvedEndpoint,
    /// 取得元
    pub source: CandidateSource,
}
