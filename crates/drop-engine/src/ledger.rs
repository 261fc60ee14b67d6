// crates/drop-engine/src/ledger.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::clock::{DropClock, Phase};
use crate::{DropError, Price, ProductConfig, ProductSnapshot, ShareAccepted, ShareRecord, UserId};

// ================================================
// The Price Ledger (Core Logic, Sync & Single-Writer)
// ================================================
// Semua mutasi harga dan share record untuk satu produk terjadi di sini.
// Struct ini tidak thread-safe dengan sengaja: hanya ProductProcessor (actor)
// yang memegangnya, sehingga check-dedup + decrement selalu satu unit.
pub struct ProductLedger {
    config: ProductConfig,
    clock: DropClock,
    current_price: Price,
    shares: HashMap<UserId, ShareRecord>,
    sequence: u64, // Nomor urut commit, naik setiap harga berubah
}

impl ProductLedger {
    pub fn new(config: ProductConfig) -> Self {
        // Config dari journal belum tentu lolos validate; window disaturasi
        let ends_at = config.ends_at().unwrap_or(DateTime::<Utc>::MAX_UTC);
        let clock = DropClock::until(config.drop_start, ends_at);
        Self {
            current_price: config.base_price,
            config,
            clock,
            shares: HashMap::new(),
            sequence: 0,
        }
    }

    pub fn config(&self) -> &ProductConfig {
        &self.config
    }

    pub fn product_id(&self) -> &str {
        &self.config.id
    }

    pub fn clock(&self) -> &DropClock {
        &self.clock
    }

    pub fn current_price(&self) -> Price {
        self.current_price
    }

    pub fn total_shares(&self) -> u64 {
        self.shares.len() as u64
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn has_shared(&self, user_id: &str) -> bool {
        self.shares.contains_key(user_id)
    }

    /// Turunkan harga sebesar `amount`. Gagal dengan `Exhausted` jika hasilnya
    /// di bawah floor, dan `DropEnded` jika drop sudah beku.
    pub fn try_decrement(&mut self, amount: Price, now: DateTime<Utc>) -> Result<Price, DropError> {
        if self.clock.phase(now) == Phase::Ended {
            return Err(DropError::DropEnded);
        }
        let new_price = self.checked_decrement(amount)?;
        self.current_price = new_price;
        self.sequence += 1;
        Ok(new_price)
    }

    // Fungsi utama untuk memproses share.
    // Urutan cek: identitas -> fase -> dedup -> floor. Semua cek dilakukan
    // sebelum mutasi apapun, jadi record dan decrement sukses/gagal bersamaan.
    pub fn try_share(&mut self, user_id: &str, now: DateTime<Utc>) -> Result<ShareAccepted, DropError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(DropError::InvalidUser);
        }

        // 1. Phase gate (murah, sebelum sentuh harga)
        match self.clock.phase(now) {
            Phase::Pending => return Err(DropError::NotStarted),
            Phase::Ended => return Err(DropError::DropEnded),
            Phase::Live => {}
        }

        // 2. Dedup
        if self.shares.contains_key(user_id) {
            return Err(DropError::DuplicateShare);
        }

        // 3. Floor check
        let new_price = self.checked_decrement(self.config.step)?;

        // 4. Commit (record + harga bersamaan)
        let record = ShareRecord {
            product_id: self.config.id.clone(),
            user_id: user_id.to_string(),
            accepted_at: now,
        };
        self.shares.insert(record.user_id.clone(), record.clone());
        self.current_price = new_price;
        self.sequence += 1;

        Ok(ShareAccepted {
            record,
            new_price,
            total_shares: self.total_shares(),
            sequence: self.sequence,
        })
    }

    fn checked_decrement(&self, amount: Price) -> Result<Price, DropError> {
        self.current_price
            .checked_sub(amount)
            .filter(|price| *price >= self.config.floor_price)
            .ok_or(DropError::Exhausted {
                current: self.current_price,
                floor: self.config.floor_price,
            })
    }

    /// Dipakai saat replay journal. Record duplikat ditolak (backstop unique
    /// constraint di storage layer).
    pub fn restore_share(&mut self, record: ShareRecord, new_price: Price) -> bool {
        if self.shares.contains_key(&record.user_id) {
            warn!(
                product_id = %self.config.id,
                user_id = %record.user_id,
                "duplicate share record in journal, skipping"
            );
            return false;
        }
        self.shares.insert(record.user_id.clone(), record);
        self.restore_price(new_price);
        true
    }

    /// Harga tidak pernah naik, termasuk saat replay.
    pub fn restore_price(&mut self, price: Price) {
        let price = price.max(self.config.floor_price);
        if price < self.current_price {
            self.current_price = price;
        }
        self.sequence += 1;
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> ProductSnapshot {
        ProductSnapshot {
            id: self.config.id.clone(),
            base_price: self.config.base_price,
            current_price: self.current_price,
            floor_price: self.config.floor_price,
            step: self.config.step,
            drop_time: self.config.drop_start,
            drop_duration_secs: self.config.drop_duration_secs,
            brand_url: self.config.brand_url.clone(),
            phase: self.clock.phase(now),
            time_remaining_secs: self.clock.time_remaining(now).num_seconds(),
            total_shares: self.total_shares(),
            sequence: self.sequence,
        }
    }
}
