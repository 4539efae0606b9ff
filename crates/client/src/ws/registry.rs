use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

pub type HandlerId = u64;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Multi-subscriber callback registry for one event kind.
pub struct Handlers<T> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(HandlerId, Handler<T>)>>,
}

impl<T> Handlers<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().await.push((id, Arc::new(handler)));
        id
    }

    pub async fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(hid, _)| *hid != id);
        entries.len() != before
    }

    pub async fn emit(&self, value: &T) {
        let handlers: Vec<Handler<T>> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(value);
        }
    }
}

impl<T> Default for Handlers<T> {
    fn default() -> Self {
        Self::new()
    }
}
