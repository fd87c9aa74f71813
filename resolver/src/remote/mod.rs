//! リモート設定チャネル
//!
//! プッシュ通知に対応したリモートキーバリューストアの抽象。
//! 単一キーに対して「単発取得」と「ライブ更新の購読」を提供する。
//!
//! 購読の解除はストリームのdropで行う。実装はdrop時に接続・リスナーを
//! すべて解放しなければならない。

pub mod memory;
pub mod rtdb;

pub use memory::MemoryChannel;
pub use rtdb::RtdbChannel;

use async_trait::async_trait;
use endpoint_resolver_common::ResolverResult;
use futures::stream::BoxStream;

/// ライブ更新ストリーム
///
/// - `Ok(Some(value))`: 新しい値
/// - `Ok(None)`: キーが削除された / 値が文字列でない
/// - `Err(_)`: 終端エラー（以後の更新は届かない）
///
/// ストリームの終了も終端として扱う。
pub type LiveUpdates = BoxStream<'static, ResolverResult<Option<String>>>;

/// リモート設定チャネル
#[async_trait]
pub trait RemoteConfigChannel: Send + Sync {
    /// キーの現在値を1回だけ取得する
    async fn get(&self, key: &str) -> ResolverResult<Option<String>>;

    /// キーのライブ更新を購読する
    ///
    /// 購読直後に現在値が1回配信される（値が存在する場合）。
    async fn subscribe(&self, key: &str) -> ResolverResult<LiveUpdates>;
}
