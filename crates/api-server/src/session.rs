// crates/api-server/src/session.rs

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use drop_engine::{DropError, EngineEvent, ProductHandle, ProductSnapshot, SessionId};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::protocol::{rejection, ClientMessage, OutboundEvent, ServerMessage};
use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Subscribed,
    Closed,
}

/// Actor per socket: menerjemahkan pesan client ke operasi ledger.
/// Tidak memegang state harga, hanya subscription.
pub struct ConnectionSession {
    id: SessionId,
    product: ProductHandle,
    state: SessionState,
}

impl ConnectionSession {
    pub fn new(id: SessionId, product: ProductHandle) -> Self {
        Self {
            id,
            product,
            state: SessionState::Connecting,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// CONNECTING -> SUBSCRIBED. Mengembalikan antrian event dan snapshot awal.
    pub async fn subscribe(&mut self, queue_capacity: usize) -> Result<(mpsc::Receiver<EngineEvent>, ProductSnapshot), DropError> {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let snapshot = self.product.subscribe(self.id, tx).await?;
        self.state = SessionState::Subscribed;
        Ok((rx, snapshot))
    }

    /// Proses satu frame teks. Hasil share yang sukses tidak dibalas di sini:
    /// caller menerimanya lewat broadcast yang sama dengan viewer lain.
    pub async fn handle_text(&self, text: &str) -> Option<ServerMessage> {
        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(session = self.id, error = %e, "malformed client message");
                return Some(ServerMessage::error("Invalid message"));
            }
        };

        match msg {
            ClientMessage::ShareClick { user_id } => {
                let user_id = user_id.unwrap_or_default();
                if user_id.trim().is_empty() {
                    return Some(rejection(&DropError::InvalidUser));
                }
                match self.product.try_share(user_id).await {
                    Ok(_) => None,
                    Err(e) => Some(rejection(&e)),
                }
            }
            ClientMessage::Ping => Some(ServerMessage::Event(OutboundEvent::Pong)),
        }
    }

    /// Idempotent. Tidak ada efek ke harga.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            self.product.unsubscribe(self.id);
            self.state = SessionState::Closed;
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// WebSocket upgrade handler: `/ws/auction/:product_id`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(product_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, product_id))
}

async fn send(ws_tx: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    ws_tx.send(Message::Text(msg.to_json())).await.is_ok()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, product_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let product = match state.registry.get(&product_id) {
        Ok(product) => product,
        Err(e) => {
            let _ = send(&mut ws_tx, &rejection(&e)).await;
            let _ = ws_tx.close().await;
            return;
        }
    };

    let mut session = ConnectionSession::new(state.registry.hub().next_session_id(), product);
    let (mut events, snapshot) = match session.subscribe(state.session_queue).await {
        Ok(subscribed) => subscribed,
        Err(e) => {
            warn!(product_id = %product_id, error = %e, "subscribe failed");
            let _ = send(&mut ws_tx, &rejection(&e)).await;
            return;
        }
    };

    info!(session = session.id(), product_id = %product_id, "client connected");

    // Late joiner langsung konsisten dengan state terkini
    if !send(&mut ws_tx, &ServerMessage::from(&snapshot)).await {
        return;
    }

    let mut ping_interval = interval(PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // Event broadcast dari hub
            event = events.recv() => match event {
                Some(event) => {
                    if !send(&mut ws_tx, &ServerMessage::from(event)).await {
                        break;
                    }
                }
                None => {
                    // Hub menutup antrian: session terlalu lambat
                    warn!(session = session.id(), "session evicted by hub");
                    break;
                }
            },

            // Pesan dari client
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = session.handle_text(&text).await {
                        if !send(&mut ws_tx, &reply).await {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    let reply = match std::str::from_utf8(&data) {
                        Ok(text) => session.handle_text(text).await,
                        Err(_) => Some(ServerMessage::error("Invalid message")),
                    };
                    if let Some(reply) = reply {
                        if !send(&mut ws_tx, &reply).await {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // Ping/Pong ditangani axum
                Some(Err(e)) => {
                    debug!(session = session.id(), error = %e, "websocket error");
                    break;
                }
            },

            _ = ping_interval.tick() => {
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    session.close();
    info!(session = session.id(), product_id = %product_id, "client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use drop_engine::{BroadcastHub, LedgerRegistry, ManualClock, ProductConfig};

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap()
    }

    fn setup(base: u64) -> (Arc<LedgerRegistry>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start() + ChronoDuration::seconds(5)));
        let registry = Arc::new(LedgerRegistry::new(BroadcastHub::new(), clock.clone()));
        registry
            .provision(ProductConfig {
                id: "p1".into(),
                base_price: base,
                floor_price: 0,
                step: 1,
                drop_start: start(),
                drop_duration_secs: 3_600,
                brand_url: None,
            })
            .unwrap();
        (registry, clock)
    }

    async fn connect(registry: &LedgerRegistry) -> (ConnectionSession, mpsc::Receiver<EngineEvent>) {
        let product = registry.get("p1").unwrap();
        let mut session = ConnectionSession::new(registry.hub().next_session_id(), product);
        let (rx, _snapshot) = session.subscribe(16).await.unwrap();
        (session, rx)
    }

    fn share(user: &str) -> String {
        format!(r#"{{"action":"share_click","user_id":"{user}"}}"#)
    }

    fn price_of(event: EngineEvent) -> u64 {
        match event {
            EngineEvent::PriceUpdated { new_price, .. } => new_price,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_three_users_converge_for_watcher() {
        let (registry, _clock) = setup(500);
        let (watcher, mut watcher_rx) = connect(&registry).await;
        assert_eq!(watcher.state(), SessionState::Subscribed);

        let mut sharers = Vec::new();
        for _ in 0..3 {
            sharers.push(connect(&registry).await);
        }

        let messages: Vec<String> = (0..3).map(|i| share(&format!("user-{i}"))).collect();
        let tasks: Vec<_> = sharers
            .iter()
            .zip(messages.iter())
            .map(|((session, _), msg)| session.handle_text(msg))
            .collect();
        for reply in futures::future::join_all(tasks).await {
            // Sukses tidak dibalas unicast
            assert_eq!(reply, None);
        }

        let seen: Vec<u64> = vec![
            price_of(watcher_rx.recv().await.unwrap()),
            price_of(watcher_rx.recv().await.unwrap()),
            price_of(watcher_rx.recv().await.unwrap()),
        ];
        assert_eq!(seen, vec![499, 498, 497]);

        // Pengirim juga menerima lewat jalur broadcast yang sama
        for (_, rx) in sharers.iter_mut() {
            let mut last = 0;
            for _ in 0..3 {
                last = price_of(rx.recv().await.unwrap());
            }
            assert_eq!(last, 497);
        }
        assert_eq!(registry.get("p1").unwrap().snapshot().await.unwrap().total_shares, 3);
    }

    #[tokio::test]
    async fn test_duplicate_share_is_unicast_error() {
        let (registry, _clock) = setup(500);
        let (session, mut rx) = connect(&registry).await;

        assert_eq!(session.handle_text(&share("alice")).await, None);
        assert_eq!(
            session.handle_text(&share("alice")).await,
            Some(ServerMessage::error("DuplicateShare"))
        );

        assert_eq!(price_of(rx.recv().await.unwrap()), 499);
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.get("p1").unwrap().price(), 499);
    }

    #[tokio::test]
    async fn test_drop_ended_freezes_price() {
        let (registry, clock) = setup(500);
        let (session, _rx) = connect(&registry).await;
        session.handle_text(&share("alice")).await;

        clock.advance(ChronoDuration::hours(2));
        for user in ["bob", "carol"] {
            assert_eq!(
                session.handle_text(&share(user)).await,
                Some(ServerMessage::error("The drop has ended"))
            );
        }
        assert_eq!(registry.get("p1").unwrap().price(), 499);
    }

    #[tokio::test]
    async fn test_malformed_and_missing_user() {
        let (registry, _clock) = setup(500);
        let (session, _rx) = connect(&registry).await;

        assert_eq!(session.handle_text("{oops").await, Some(ServerMessage::error("Invalid message")));
        assert_eq!(
            session.handle_text(r#"{"action":"share_click"}"#).await,
            Some(ServerMessage::error("User ID is required to share"))
        );
        assert_eq!(
            session.handle_text(r#"{"action":"share_click","user_id":"  "}"#).await,
            Some(ServerMessage::error("User ID is required to share"))
        );
        assert_eq!(
            session.handle_text(r#"{"action":"ping"}"#).await,
            Some(ServerMessage::Event(OutboundEvent::Pong))
        );
        // Session tetap hidup
        assert_eq!(session.state(), SessionState::Subscribed);
        assert_eq!(registry.get("p1").unwrap().price(), 500);
    }

    #[tokio::test]
    async fn test_floor_notice() {
        let (registry, _clock) = setup(1);
        let (session, _rx) = connect(&registry).await;
        assert_eq!(session.handle_text(&share("a")).await, None);
        assert_eq!(
            session.handle_text(&share("b")).await,
            Some(ServerMessage::Notice {
                message: "Price has reached the minimum limit.".into()
            })
        );
    }

    #[tokio::test]
    async fn test_close_unsubscribes_without_touching_price() {
        let (registry, _clock) = setup(500);
        let (mut session, _rx) = connect(&registry).await;
        assert_eq!(registry.hub().subscriber_count("p1"), 1);

        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(registry.hub().subscriber_count("p1"), 0);

        {
            let _dropped = connect(&registry).await;
            assert_eq!(registry.hub().subscriber_count("p1"), 1);
        }
        assert_eq!(registry.hub().subscriber_count("p1"), 0);
        assert_eq!(registry.get("p1").unwrap().price(), 500);
    }
}
