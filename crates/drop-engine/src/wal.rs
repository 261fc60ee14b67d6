// crates/drop-engine/src/wal.rs

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{Price, ProductConfig, ProductId, ProductLedger, ShareRecord};

/// Entry journal append-only. Layout ini adalah kontrak persisted state:
/// baris produk (config + harga) dan tabel share unik per (product, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    Provisioned(ProductConfig),
    Share { record: ShareRecord, new_price: Price },
    Decrement { product_id: ProductId, amount: Price, new_price: Price },
}

pub type JournalSender = mpsc::UnboundedSender<LogEntry>;

pub struct WalHandler {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl WalHandler {
    // Membuka atau membuat file WAL baru
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Menulis satu entry ke disk
    pub fn write_entry(&mut self, entry: &LogEntry) -> std::io::Result<()> {
        bincode::serialize_into(&mut self.writer, entry)
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;

        // Volume share kecil, flush per entry
        self.writer.flush()
    }

    // Membaca ulang semua entry saat startup (Recovery)
    pub fn read_all(path: impl AsRef<Path>) -> std::io::Result<Vec<LogEntry>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();

        // Loop baca file sampai EOF (End of File)
        loop {
            match bincode::deserialize_from(&mut reader) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    let clean_eof = matches!(
                        e.as_ref(),
                        bincode::ErrorKind::Io(io) if io.kind() == ErrorKind::UnexpectedEof
                    );
                    if !clean_eof {
                        warn!(path = %path.display(), error = %e, entries = entries.len(), "journal tail is corrupt, truncating replay");
                    }
                    break;
                }
            }
        }

        Ok(entries)
    }
}

/// Writer berjalan di thread blocking sendiri; actor produk hanya mengirim
/// entry lewat channel sehingga disk I/O tidak pernah masuk critical section.
pub fn spawn_writer(mut handler: WalHandler) -> (JournalSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<LogEntry>();
    let handle = tokio::task::spawn_blocking(move || {
        info!(path = %handler.path().display(), "journal writer started");
        while let Some(entry) = rx.blocking_recv() {
            if let Err(e) = handler.write_entry(&entry) {
                error!(error = %e, ?entry, "failed to append journal entry");
            }
        }
        info!("journal writer stopped");
    });
    (tx, handle)
}

/// Bangun ulang ledger dari journal, urut sesuai provisioning.
pub fn replay(entries: Vec<LogEntry>) -> Vec<ProductLedger> {
    let mut order: Vec<ProductId> = Vec::new();
    let mut ledgers: HashMap<ProductId, ProductLedger> = HashMap::new();

    for entry in entries {
        match entry {
            LogEntry::Provisioned(config) => {
                if ledgers.contains_key(&config.id) {
                    continue;
                }
                order.push(config.id.clone());
                ledgers.insert(config.id.clone(), ProductLedger::new(config));
            }
            LogEntry::Share { record, new_price } => match ledgers.get_mut(&record.product_id) {
                Some(ledger) => {
                    ledger.restore_share(record, new_price);
                }
                None => warn!(product_id = %record.product_id, "share for unknown product in journal"),
            },
            LogEntry::Decrement {
                product_id, new_price, ..
            } => match ledgers.get_mut(&product_id) {
                Some(ledger) => ledger.restore_price(new_price),
                None => warn!(product_id = %product_id, "decrement for unknown product in journal"),
            },
        }
    }

    order
        .into_iter()
        .filter_map(|id| ledgers.remove(&id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn config(id: &str) -> ProductConfig {
        ProductConfig {
            id: id.into(),
            base_price: 150,
            floor_price: 0,
            step: 1,
            drop_start: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            drop_duration_secs: 86_400,
            brand_url: Some("https://example.com/jacket".into()),
        }
    }

    fn share(product: &str, user: &str, new_price: Price) -> LogEntry {
        LogEntry::Share {
            record: ShareRecord {
                product_id: product.into(),
                user_id: user.into(),
                accepted_at: Utc.with_ymd_and_hms(2026, 2, 1, 1, 0, 0).unwrap(),
            },
            new_price,
        }
    }

    #[test]
    fn test_write_then_recover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shares.wal");

        {
            let mut wal = WalHandler::new(&path).unwrap();
            wal.write_entry(&LogEntry::Provisioned(config("jacket"))).unwrap();
            wal.write_entry(&share("jacket", "alice", 149)).unwrap();
            wal.write_entry(&share("jacket", "bob", 148)).unwrap();
        }

        let entries = WalHandler::read_all(&path).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], LogEntry::Provisioned(config("jacket")));

        let ledgers = replay(entries);
        assert_eq!(ledgers.len(), 1);
        assert_eq!(ledgers[0].current_price(), 148);
        assert_eq!(ledgers[0].total_shares(), 2);
        assert!(ledgers[0].has_shared("bob"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = WalHandler::read_all(dir.path().join("nothing.wal")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_truncated_tail_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shares.wal");
        {
            let mut wal = WalHandler::new(&path).unwrap();
            wal.write_entry(&LogEntry::Provisioned(config("jacket"))).unwrap();
            wal.write_entry(&share("jacket", "alice", 149)).unwrap();
        }
        // Simulasi crash di tengah write
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();

        let entries = WalHandler::read_all(&path).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_replay_enforces_unique_share() {
        let ledgers = replay(vec![
            LogEntry::Provisioned(config("jacket")),
            share("jacket", "alice", 149),
            share("jacket", "alice", 148),
            share("ghost", "bob", 10),
            LogEntry::Decrement {
                product_id: "jacket".into(),
                amount: 4,
                new_price: 145,
            },
        ]);

        assert_eq!(ledgers[0].total_shares(), 1);
        assert_eq!(ledgers[0].current_price(), 145);
    }

    #[test]
    fn test_replay_keeps_provision_order() {
        let ledgers = replay(vec![
            LogEntry::Provisioned(config("b")),
            LogEntry::Provisioned(config("a")),
            LogEntry::Provisioned(config("b")),
        ]);
        let ids: Vec<_> = ledgers.iter().map(|l| l.product_id().to_string()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_writer_task_persists_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shares.wal");
        let (tx, handle) = spawn_writer(WalHandler::new(&path).unwrap());

        tx.send(LogEntry::Provisioned(config("jacket"))).unwrap();
        tx.send(share("jacket", "alice", 149)).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(WalHandler::read_all(&path).unwrap().len(), 2);
    }
}
