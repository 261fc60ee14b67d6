// crates/api-server/src/protocol.rs

use chrono::{DateTime, Utc};
use drop_engine::{DropError, EngineEvent, Phase, Price, ProductSnapshot};
use serde::{Deserialize, Serialize};

/// Pesan client -> server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    ShareClick {
        #[serde(default)]
        user_id: Option<String>,
    },
    Ping,
}

/// Pesan server -> client. Bentuknya mengikuti kontrak frontend:
/// event bertipe (`{"type": ...}`), error unicast (`{"error": ...}`),
/// dan notice informatif (`{"message": ...}`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Event(OutboundEvent),
    Error { error: String },
    Notice { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Snapshot {
        product_id: String,
        current_price: Price,
        total_shares: u64,
        phase: Phase,
        drop_time: DateTime<Utc>,
        time_remaining_secs: i64,
    },
    PriceUpdate {
        product_id: String,
        new_price: Price,
        total_shares: u64,
    },
    FloorReached {
        product_id: String,
        price: Price,
    },
    Pong,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { error: message.into() }
    }

    pub fn to_json(&self) -> String {
        // Semua varian bisa diserialisasi; fallback hanya untuk jaga-jaga
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string())
    }
}

impl From<EngineEvent> for ServerMessage {
    fn from(event: EngineEvent) -> Self {
        match event {
            EngineEvent::PriceUpdated {
                product_id,
                new_price,
                total_shares,
                ..
            } => ServerMessage::Event(OutboundEvent::PriceUpdate {
                product_id,
                new_price,
                total_shares,
            }),
            EngineEvent::FloorReached { product_id, price, .. } => {
                ServerMessage::Event(OutboundEvent::FloorReached { product_id, price })
            }
        }
    }
}

impl From<&ProductSnapshot> for ServerMessage {
    fn from(snapshot: &ProductSnapshot) -> Self {
        ServerMessage::Event(OutboundEvent::Snapshot {
            product_id: snapshot.id.clone(),
            current_price: snapshot.current_price,
            total_shares: snapshot.total_shares,
            phase: snapshot.phase,
            drop_time: snapshot.drop_time,
            time_remaining_secs: snapshot.time_remaining_secs,
        })
    }
}

/// Pemetaan penolakan share ke frame unicast.
pub fn rejection(err: &DropError) -> ServerMessage {
    match err {
        DropError::Exhausted { .. } => ServerMessage::Notice {
            message: err.to_string(),
        },
        DropError::DuplicateShare
        | DropError::DropEnded
        | DropError::NotStarted
        | DropError::InvalidUser
        | DropError::UnknownProduct(_) => ServerMessage::error(err.to_string()),
        DropError::InvalidConfig(_) | DropError::EngineDown | DropError::Journal(_) => {
            ServerMessage::error("Could not record share")
        }
    }
}
