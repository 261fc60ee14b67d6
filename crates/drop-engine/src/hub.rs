// crates/drop-engine/src/hub.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::{EngineEvent, ProductId};

pub type SessionId = u64;

type Topic = HashMap<SessionId, mpsc::Sender<EngineEvent>>;

/// Fan-out per produk. Setiap session punya antrian outbound sendiri (bounded).
/// Hub tidak pernah menunggu session: kalau antrian penuh, session di-evict.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    topics: RwLock<HashMap<ProductId, Topic>>,
    next_session: AtomicU64,
    evicted: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_session_id(&self) -> SessionId {
        self.inner.next_session.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Idempotent: subscribe ulang dengan session yang sama tidak mengganti antrian lama.
    pub fn subscribe(&self, product_id: &str, session: SessionId, queue: mpsc::Sender<EngineEvent>) -> bool {
        let mut topics = self.inner.topics.write();
        let topic = topics.entry(product_id.to_string()).or_default();
        if topic.contains_key(&session) {
            return false;
        }
        topic.insert(session, queue);
        debug!(product_id, session, subscribers = topic.len(), "session subscribed");
        true
    }

    /// Idempotent.
    pub fn unsubscribe(&self, product_id: &str, session: SessionId) -> bool {
        let mut topics = self.inner.topics.write();
        let Some(topic) = topics.get_mut(product_id) else {
            return false;
        };
        let removed = topic.remove(&session).is_some();
        if topic.is_empty() {
            topics.remove(product_id);
        }
        if removed {
            debug!(product_id, session, "session unsubscribed");
        }
        removed
    }

    /// Kirim event ke semua subscriber produk. Mengembalikan jumlah session yang menerima.
    ///
    /// Dipanggil hanya dari actor produk, sehingga urutan antar event satu produk
    /// sama untuk semua session (tiap antrian FIFO).
    pub fn publish(&self, product_id: &str, event: EngineEvent) -> usize {
        let mut delivered = 0;
        let mut stale = Vec::new();

        {
            let topics = self.inner.topics.read();
            let Some(topic) = topics.get(product_id) else {
                return 0;
            };
            for (session, queue) in topic {
                match queue.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(product_id, session, "outbound queue full, evicting slow session");
                        stale.push((*session, true));
                    }
                    Err(TrySendError::Closed(_)) => stale.push((*session, false)),
                }
            }
        }

        if !stale.is_empty() {
            let mut topics = self.inner.topics.write();
            if let Some(topic) = topics.get_mut(product_id) {
                for (session, slow) in &stale {
                    // Drop sender -> receiver session melihat channel tertutup
                    topic.remove(session);
                    if *slow {
                        self.inner.evicted.fetch_add(1, Ordering::Relaxed);
                    }
                }
                if topic.is_empty() {
                    topics.remove(product_id);
                }
            }
        }

        delivered
    }

    pub fn subscriber_count(&self, product_id: &str) -> usize {
        self.inner.topics.read().get(product_id).map_or(0, |topic| topic.len())
    }

    pub fn session_count(&self) -> usize {
        self.inner.topics.read().values().map(|topic| topic.len()).sum()
    }

    pub fn evicted_total(&self) -> u64 {
        self.inner.evicted.load(Ordering::Relaxed)
    }
}
