// crates/drop-engine/src/registry.rs

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::hub::BroadcastHub;
use crate::processor::{ProductHandle, ProductProcessor};
use crate::wal::{JournalSender, LogEntry};
use crate::{DropError, ProductConfig, ProductLedger, TimeSource};

pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

/// Peta product id -> actor. Tidak ada lock global di jalur share:
/// lock di sini hanya dipakai untuk lookup handle.
pub struct LedgerRegistry {
    products: RwLock<HashMap<String, ProductHandle>>,
    hub: BroadcastHub,
    time: Arc<dyn TimeSource>,
    journal: Option<JournalSender>,
    inbox_capacity: usize,
}

impl LedgerRegistry {
    pub fn new(hub: BroadcastHub, time: Arc<dyn TimeSource>) -> Self {
        Self {
            products: RwLock::new(HashMap::new()),
            hub,
            time,
            journal: None,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }

    pub fn with_journal(mut self, journal: JournalSender) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub fn time(&self) -> &Arc<dyn TimeSource> {
        &self.time
    }

    /// Buat ledger + actor baru. Provisioning ulang id yang sama adalah no-op.
    pub fn provision(&self, config: ProductConfig) -> Result<ProductHandle, DropError> {
        config.validate()?;

        let mut products = self.products.write();
        if let Some(existing) = products.get(&config.id) {
            return Ok(existing.clone());
        }

        if let Some(journal) = &self.journal {
            journal
                .send(LogEntry::Provisioned(config.clone()))
                .map_err(|e| DropError::Journal(e.to_string()))?;
        }

        info!(product_id = %config.id, base_price = config.base_price, floor_price = config.floor_price, "product provisioned");
        let handle = self.spawn(ProductLedger::new(config));
        products.insert(handle.product_id().to_string(), handle.clone());
        Ok(handle)
    }

    /// Pasang ledger hasil replay journal (tanpa menulis ulang ke journal).
    pub fn restore(&self, ledger: ProductLedger) -> ProductHandle {
        let mut products = self.products.write();
        if let Some(existing) = products.get(ledger.product_id()) {
            return existing.clone();
        }
        info!(
            product_id = %ledger.product_id(),
            price = ledger.current_price(),
            shares = ledger.total_shares(),
            "product restored from journal"
        );
        let handle = self.spawn(ledger);
        products.insert(handle.product_id().to_string(), handle.clone());
        handle
    }

    pub fn get(&self, product_id: &str) -> Result<ProductHandle, DropError> {
        self.products
            .read()
            .get(product_id)
            .cloned()
            .ok_or_else(|| DropError::UnknownProduct(product_id.to_string()))
    }

    /// Semua handle, urut berdasarkan product id.
    pub fn handles(&self) -> Vec<ProductHandle> {
        let mut handles: Vec<_> = self.products.read().values().cloned().collect();
        handles.sort_by(|a, b| a.product_id().cmp(b.product_id()));
        handles
    }

    pub fn len(&self) -> usize {
        self.products.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn(&self, ledger: ProductLedger) -> ProductHandle {
        ProductProcessor::spawn(
            ledger,
            self.hub.clone(),
            self.time.clone(),
            self.journal.clone(),
            self.inbox_capacity,
        )
    }
}
