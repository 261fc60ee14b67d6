// crates/drop-engine/src/lib.rs

pub mod clock;
pub mod hub;
pub mod ledger;
pub mod processor;
pub mod registry;
pub mod wal;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use clock::{DropClock, ManualClock, Phase, SystemClock, TimeSource};
pub use hub::{BroadcastHub, SessionId};
pub use ledger::ProductLedger;
pub use processor::{Command, ProductHandle, ProductProcessor};
pub use registry::LedgerRegistry;

// ====================================================
// Data Structures
// ====================================================
pub type ProductId = String;
pub type UserId = String;
pub type Price = u64; // Unit harga utuh (misal: rupee), menghindari floating point error

/// Konfigurasi awal sebuah drop. Dibuat oleh provisioning eksternal,
/// immutable selama drop berjalan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductConfig {
    pub id: ProductId,
    pub base_price: Price,
    pub floor_price: Price,
    pub step: Price, // Besar penurunan harga per share yang diterima
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub drop_start: DateTime<Utc>,
    pub drop_duration_secs: i64,
    pub brand_url: Option<String>,
}

impl ProductConfig {
    pub fn validate(&self) -> Result<(), DropError> {
        if self.id.trim().is_empty() {
            return Err(DropError::InvalidConfig("product id is empty".into()));
        }
        if self.step == 0 {
            return Err(DropError::InvalidConfig("step must be greater than zero".into()));
        }
        if self.base_price < self.floor_price {
            return Err(DropError::InvalidConfig(format!(
                "base price {} is below floor price {}",
                self.base_price, self.floor_price
            )));
        }
        if self.drop_duration_secs <= 0 {
            return Err(DropError::InvalidConfig("drop duration must be positive".into()));
        }
        if self.ends_at().is_none() {
            return Err(DropError::InvalidConfig(format!(
                "drop duration of {}s is out of range",
                self.drop_duration_secs
            )));
        }
        Ok(())
    }

    pub fn drop_duration(&self) -> Option<Duration> {
        Duration::try_seconds(self.drop_duration_secs)
    }

    /// `drop_start + drop_duration`, atau `None` kalau di luar rentang kalender.
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.drop_duration()
            .and_then(|duration| self.drop_start.checked_add_signed(duration))
    }
}

/// Bukti bahwa seorang user sudah share. Unik per (product, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRecord {
    pub product_id: ProductId,
    pub user_id: UserId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub accepted_at: DateTime<Utc>,
}

/// Hasil share yang sukses, dipakai untuk broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareAccepted {
    pub record: ShareRecord,
    pub new_price: Price,
    pub total_shares: u64,
    pub sequence: u64,
}

/// Snapshot state produk untuk late joiner dan listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub base_price: Price,
    pub current_price: Price,
    pub floor_price: Price,
    pub step: Price,
    pub drop_time: DateTime<Utc>,
    pub drop_duration_secs: i64,
    pub brand_url: Option<String>,
    pub phase: Phase,
    pub time_remaining_secs: i64,
    pub total_shares: u64,
    pub sequence: u64,
}

// Event yang dipancarkan engine ke BroadcastHub.
// Urutan event per produk = urutan commit di ProductProcessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    PriceUpdated {
        product_id: ProductId,
        new_price: Price,
        total_shares: u64,
        sequence: u64,
    },
    FloorReached {
        product_id: ProductId,
        price: Price,
        sequence: u64,
    },
}

impl EngineEvent {
    pub fn sequence(&self) -> u64 {
        match self {
            EngineEvent::PriceUpdated { sequence, .. } => *sequence,
            EngineEvent::FloorReached { sequence, .. } => *sequence,
        }
    }
}

// ================================
// Error Taxonomy
// ================================
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DropError {
    #[error("Price has reached the minimum limit.")]
    Exhausted { current: Price, floor: Price },
    #[error("DuplicateShare")]
    DuplicateShare,
    #[error("The drop has ended")]
    DropEnded,
    #[error("Drop has not started yet")]
    NotStarted,
    #[error("User ID is required to share")]
    InvalidUser,
    #[error("Product not found")]
    UnknownProduct(ProductId),
    #[error("invalid product config: {0}")]
    InvalidConfig(String),
    #[error("Engine is down")]
    EngineDown,
    #[error("journal error: {0}")]
    Journal(String),
}

impl DropError {
    /// Error yang berarti client sebaiknya berhenti mencoba share.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DropError::DropEnded | DropError::Exhausted { .. })
    }
}
