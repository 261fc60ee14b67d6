// crates/drop-engine/src/processor.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::hub::{BroadcastHub, SessionId};
use crate::wal::{JournalSender, LogEntry};
use crate::{DropError, EngineEvent, Price, ProductLedger, ProductSnapshot, ShareAccepted, TimeSource, UserId};

// Command yang bisa dikirim oleh session / API ke actor produk
#[derive(Debug)]
pub enum Command {
    Share {
        user_id: UserId,
        responder: oneshot::Sender<Result<ShareAccepted, DropError>>,
    },
    Decrement {
        amount: Price,
        responder: oneshot::Sender<Result<Price, DropError>>,
    },
    Snapshot {
        responder: oneshot::Sender<ProductSnapshot>,
    },
    // Subscribe dilakukan di dalam actor supaya snapshot dan update berikutnya
    // tidak punya celah maupun duplikat.
    Subscribe {
        session: SessionId,
        queue: mpsc::Sender<EngineEvent>,
        responder: oneshot::Sender<ProductSnapshot>,
    },
}

/// Satu actor per produk. Semua mutasi `current_price` dan share record
/// produk ini hanya terjadi di loop `run`.
pub struct ProductProcessor {
    ledger: ProductLedger, // The Ledger Core (Sync)
    receiver: mpsc::Receiver<Command>, // Inbox
    hub: BroadcastHub,
    time: Arc<dyn TimeSource>,
    price: Arc<AtomicU64>,
    journal: Option<JournalSender>,
}

impl ProductProcessor {
    /// Spawn actor di runtime tokio dan kembalikan handle-nya.
    pub fn spawn(
        ledger: ProductLedger,
        hub: BroadcastHub,
        time: Arc<dyn TimeSource>,
        journal: Option<JournalSender>,
        inbox_capacity: usize,
    ) -> ProductHandle {
        let (tx, rx) = mpsc::channel(inbox_capacity.max(1));
        let price = Arc::new(AtomicU64::new(ledger.current_price()));
        let handle = ProductHandle {
            product_id: ledger.product_id().to_string(),
            sender: tx,
            price: price.clone(),
            hub: hub.clone(),
        };

        let processor = Self {
            ledger,
            receiver: rx,
            hub,
            time,
            price,
            journal,
        };
        tokio::spawn(async move {
            processor.run().await;
        });

        handle
    }

    pub async fn run(mut self) {
        info!(product_id = %self.ledger.product_id(), price = self.ledger.current_price(), "product processor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                Command::Share { user_id, responder } => {
                    let now = self.time.now();
                    let result = self.ledger.try_share(&user_id, now);
                    match &result {
                        Ok(accepted) => self.commit_share(accepted),
                        Err(e) => {
                            debug!(product_id = %self.ledger.product_id(), user_id = %user_id, error = %e, "share rejected")
                        }
                    }
                    let _ = responder.send(result);
                }
                Command::Decrement { amount, responder } => {
                    let now = self.time.now();
                    let result = self.ledger.try_decrement(amount, now);
                    if let Ok(new_price) = result {
                        self.commit_decrement(amount, new_price);
                    }
                    let _ = responder.send(result);
                }
                Command::Snapshot { responder } => {
                    let _ = responder.send(self.ledger.snapshot(self.time.now()));
                }
                Command::Subscribe { session, queue, responder } => {
                    self.hub.subscribe(self.ledger.product_id(), session, queue);
                    let _ = responder.send(self.ledger.snapshot(self.time.now()));
                }
            }
        }

        info!(product_id = %self.ledger.product_id(), "product processor stopped");
    }

    // Urutan commit: harga atomik -> journal -> broadcast. Responder dibalas
    // setelah broadcast, jadi pemanggil tidak pernah mendahului hub.
    fn commit_share(&mut self, accepted: &ShareAccepted) {
        self.price.store(accepted.new_price, Ordering::Release);

        append_journal(
            self.journal.as_ref(),
            LogEntry::Share {
                record: accepted.record.clone(),
                new_price: accepted.new_price,
            },
        );

        info!(
            product_id = %accepted.record.product_id,
            user_id = %accepted.record.user_id,
            new_price = accepted.new_price,
            total_shares = accepted.total_shares,
            "share accepted"
        );

        self.broadcast_price(accepted.new_price, accepted.total_shares, accepted.sequence);
    }

    fn commit_decrement(&mut self, amount: Price, new_price: Price) {
        self.price.store(new_price, Ordering::Release);

        append_journal(
            self.journal.as_ref(),
            LogEntry::Decrement {
                product_id: self.ledger.product_id().to_string(),
                amount,
                new_price,
            },
        );

        self.broadcast_price(new_price, self.ledger.total_shares(), self.ledger.sequence());
    }

    fn broadcast_price(&self, new_price: Price, total_shares: u64, sequence: u64) {
        let product_id = self.ledger.product_id().to_string();
        self.hub.publish(
            &product_id,
            EngineEvent::PriceUpdated {
                product_id: product_id.clone(),
                new_price,
                total_shares,
                sequence,
            },
        );
        if new_price == self.ledger.config().floor_price {
            self.hub.publish(
                &product_id,
                EngineEvent::FloorReached {
                    product_id: product_id.clone(),
                    price: new_price,
                    sequence,
                },
            );
        }
    }
}

// Writer mati tidak membatalkan commit in-memory, tapi harus terlihat di log.
fn append_journal(journal: Option<&JournalSender>, entry: LogEntry) -> bool {
    let Some(journal) = journal else {
        return true;
    };
    match journal.send(entry) {
        Ok(()) => true,
        Err(e) => {
            error!(entry = ?e.0, "journal writer is gone, entry not persisted");
            false
        }
    }
}

/// Handle murah (Clone) untuk berbicara dengan actor produk.
#[derive(Clone)]
pub struct ProductHandle {
    product_id: String,
    sender: mpsc::Sender<Command>,
    price: Arc<AtomicU64>,
    hub: BroadcastHub,
}

impl ProductHandle {
    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Wait-free read. Bisa sedikit stale, cukup untuk display,
    /// bukan untuk keputusan decrement.
    pub fn price(&self) -> Price {
        self.price.load(Ordering::Acquire)
    }

    pub async fn try_share(&self, user_id: impl Into<UserId>) -> Result<ShareAccepted, DropError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.send(Command::Share {
            user_id: user_id.into(),
            responder: resp_tx,
        })
        .await?;
        resp_rx.await.map_err(|_| DropError::EngineDown)?
    }

    pub async fn try_decrement(&self, amount: Price) -> Result<Price, DropError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.send(Command::Decrement {
            amount,
            responder: resp_tx,
        })
        .await?;
        resp_rx.await.map_err(|_| DropError::EngineDown)?
    }

    /// Snapshot authoritative (melewati actor).
    pub async fn snapshot(&self) -> Result<ProductSnapshot, DropError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.send(Command::Snapshot { responder: resp_tx }).await?;
        resp_rx.await.map_err(|_| DropError::EngineDown)
    }

    /// Daftarkan session ke hub dan ambil snapshot dalam satu langkah atomik.
    pub async fn subscribe(
        &self,
        session: SessionId,
        queue: mpsc::Sender<EngineEvent>,
    ) -> Result<ProductSnapshot, DropError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.send(Command::Subscribe {
            session,
            queue,
            responder: resp_tx,
        })
        .await?;
        resp_rx.await.map_err(|_| DropError::EngineDown)
    }

    pub fn unsubscribe(&self, session: SessionId) -> bool {
        self.hub.unsubscribe(&self.product_id, session)
    }

    async fn send(&self, command: Command) -> Result<(), DropError> {
        // Jika channel tertutup, berarti actor mati
        self.sender.send(command).await.map_err(|_| DropError::EngineDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ProductConfig;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashSet;

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap()
    }

    fn spawn(base: Price, floor: Price) -> (ProductHandle, BroadcastHub, Arc<ManualClock>) {
        spawn_with_step(base, floor, 1)
    }

    fn spawn_with_step(base: Price, floor: Price, step: Price) -> (ProductHandle, BroadcastHub, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start() + Duration::seconds(1)));
        let hub = BroadcastHub::new();
        let ledger = ProductLedger::new(ProductConfig {
            id: "drop-1".into(),
            base_price: base,
            floor_price: floor,
            step,
            drop_start: start(),
            drop_duration_secs: 600,
            brand_url: None,
        });
        let handle = ProductProcessor::spawn(ledger, hub.clone(), clock.clone(), None, 64);
        (handle, hub, clock)
    }

    #[tokio::test]
    async fn test_concurrent_distinct_users_all_accepted() {
        let (handle, _hub, _clock) = spawn(500, 0);

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.try_share(format!("user-{i}")).await })
            })
            .collect();

        let mut prices = HashSet::new();
        for task in tasks {
            let accepted = task.await.unwrap().unwrap();
            prices.insert(accepted.new_price);
        }

        // Setiap share melihat harga yang berbeda (serialized)
        assert_eq!(prices.len(), 50);
        assert_eq!(handle.price(), 450);
        assert_eq!(handle.snapshot().await.unwrap().total_shares, 50);
    }

    #[tokio::test]
    async fn test_concurrent_same_user_only_one_wins() {
        let (handle, _hub, _clock) = spawn(500, 0);

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.try_share("mallory").await })
            })
            .collect();

        let mut ok = 0;
        let mut dup = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => ok += 1,
                Err(DropError::DuplicateShare) => dup += 1,
                Err(e) => panic!("unexpected error {e:?}"),
            }
        }
        assert_eq!((ok, dup), (1, 19));
        assert_eq!(handle.price(), 499);
    }

    #[tokio::test]
    async fn test_concurrent_shares_with_step_two() {
        let (handle, _hub, _clock) = spawn_with_step(5, 0, 2);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.try_share(format!("user-{i}")).await })
            })
            .collect();

        let mut accepted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(DropError::Exhausted { .. }) => {}
                Err(e) => panic!("unexpected error {e:?}"),
            }
        }
        assert_eq!(accepted, 2);
        assert_eq!(handle.price(), 1);
        assert_eq!(handle.snapshot().await.unwrap().total_shares, 2);
    }

    #[tokio::test]
    async fn test_share_survives_closed_journal() {
        let (journal_tx, journal_rx) = tokio::sync::mpsc::unbounded_channel();
        drop(journal_rx);
        assert!(!append_journal(
            Some(&journal_tx),
            LogEntry::Decrement {
                product_id: "drop-1".into(),
                amount: 1,
                new_price: 9,
            },
        ));
        assert!(append_journal(
            None,
            LogEntry::Decrement {
                product_id: "drop-1".into(),
                amount: 1,
                new_price: 9,
            },
        ));

        let clock = Arc::new(ManualClock::new(start() + Duration::seconds(1)));
        let ledger = ProductLedger::new(ProductConfig {
            id: "drop-1".into(),
            base_price: 10,
            floor_price: 0,
            step: 1,
            drop_start: start(),
            drop_duration_secs: 600,
            brand_url: None,
        });
        let handle = ProductProcessor::spawn(ledger, BroadcastHub::new(), clock, Some(journal_tx), 8);
        assert_eq!(handle.try_share("alice").await.unwrap().new_price, 9);
        assert_eq!(handle.price(), 9);
    }

    #[tokio::test]
    async fn test_accepted_count_bounded_by_floor() {
        let (handle, _hub, _clock) = spawn(10, 0);

        let tasks: Vec<_> = (0..30)
            .map(|i| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.try_share(format!("u{i}")).await })
            })
            .collect();

        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 10);
        assert_eq!(handle.price(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_sees_snapshot_then_ordered_updates() {
        let (handle, _hub, _clock) = spawn(500, 0);
        handle.try_share("early").await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let snapshot = handle.subscribe(1, tx).await.unwrap();
        assert_eq!(snapshot.current_price, 499);
        assert_eq!(snapshot.sequence, 1);

        for user in ["a", "b", "c"] {
            handle.try_share(user).await.unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            match rx.recv().await.unwrap() {
                EngineEvent::PriceUpdated { new_price, sequence, .. } => seen.push((sequence, new_price)),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(seen, vec![(2, 498), (3, 497), (4, 496)]);
    }

    #[tokio::test]
    async fn test_frozen_after_drop_ends() {
        let (handle, hub, clock) = spawn(500, 0);
        handle.try_share("alice").await.unwrap();

        clock.advance(Duration::minutes(11));
        assert_eq!(handle.try_share("bob").await.unwrap_err(), DropError::DropEnded);
        assert_eq!(handle.try_decrement(1).await.unwrap_err(), DropError::DropEnded);
        assert_eq!(handle.price(), 499);

        // Tidak ada broadcast untuk share yang ditolak
        let (tx, mut rx) = mpsc::channel(4);
        hub.subscribe("drop-1", 99, tx);
        let _ = handle.try_share("carol").await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_floor_reached_is_broadcast() {
        let (handle, _hub, _clock) = spawn(1, 0);
        let (tx, mut rx) = mpsc::channel(4);
        handle.subscribe(5, tx).await.unwrap();

        handle.try_share("last").await.unwrap();
        assert!(matches!(rx.recv().await, Some(EngineEvent::PriceUpdated { new_price: 0, .. })));
        assert!(matches!(rx.recv().await, Some(EngineEvent::FloorReached { price: 0, .. })));

        let err = handle.try_share("late").await.unwrap_err();
        assert!(matches!(err, DropError::Exhausted { .. }));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let (handle, hub, _clock) = spawn(500, 0);
        let (tx, mut rx) = mpsc::channel(4);
        handle.subscribe(3, tx).await.unwrap();
        assert!(handle.unsubscribe(3));
        assert_eq!(hub.subscriber_count("drop-1"), 0);

        handle.try_share("alice").await.unwrap();
        // Sender sudah di-drop oleh hub
        assert!(rx.recv().await.is_none());
    }
}
