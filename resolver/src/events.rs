//! エンドポイント変更通知
//!
//! - コールバック登録（`on_change`）: ハンドルをdropまたは`unsubscribe()`すると解除
//! - イベントバス（`subscribe`）: `tokio::sync::broadcast`で変更をブロードキャスト
//!
//! レジストリはリゾルバーが所有し、ハンドルは弱参照のみを保持する。

use endpoint_resolver_common::EndpointChange;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use uuid::Uuid;

/// イベントバスのチャネル容量
const EVENT_CHANNEL_CAPACITY: usize = 64;

type Callback = Arc<dyn Fn(&EndpointChange) + Send + Sync>;
type Registry = Mutex<HashMap<Uuid, Callback>>;

/// 変更通知の配信元
#[derive(Clone)]
pub struct ChangeNotifier {
    callbacks: Arc<Registry>,
    sender: broadcast::Sender<EndpointChange>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    /// 新しい通知元を作成
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            sender,
        }
    }

    /// コールバックを登録
    pub fn on_change<F>(&self, callback: F) -> ChangeSubscription
    where
        F: Fn(&EndpointChange) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.insert(id, Arc::new(callback));
        }

        ChangeSubscription {
            id,
            registry: Arc::downgrade(&self.callbacks),
        }
    }

    /// イベントバスを購読
    pub fn subscribe(&self) -> broadcast::Receiver<EndpointChange> {
        self.sender.subscribe()
    }

    /// 変更を配信する
    ///
    /// コールバックはロック解放後に呼び出すため、コールバック内での登録・解除も可能。
    pub fn publish(&self, change: &EndpointChange) {
        let callbacks: Vec<Callback> = match self.callbacks.lock() {
            Ok(callbacks) => callbacks.values().cloned().collect(),
            Err(_) => Vec::new(),
        };

        for callback in callbacks {
            callback(change);
        }

        // 購読者がいない場合は送信に失敗するが、無視する
        let _ = self.sender.send(change.clone());
    }

    /// 登録中のコールバック数
    pub fn callback_count(&self) -> usize {
        self.callbacks.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// コールバック登録ハンドル
///
/// dropすると登録が解除される。
#[must_use = "dropping the subscription unregisters the callback"]
pub struct ChangeSubscription {
    id: Uuid,
    registry: Weak<Registry>,
}

impl ChangeSubscription {
    /// 登録ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 明示的に登録を解除
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut callbacks) = registry.lock() {
                callbacks.remove(&self.id);
            }
        }
    }
}

impl std::fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("id", &self.id)
            .finish()
    }
}
