//! RocksDB persistence of the ledger
//!
//! After every committed transition the ledger header (counters, balances,
//! token buckets, outstanding requests) is written as one small JSON value,
//! together with a record for each bet the transition touched. Bets live
//! only in their records, so a write never grows with the bet history.
//! Record keys sort newest bet first.

use crate::bets::{Bet, BetStatus, PrizeLot};
use crate::common::types::{Address, BetId};
use crate::config::{CompressionType, StorageConfig};
use crate::errors::{StorageError, WagerResult};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const SNAPSHOT_KEY: &[u8] = b"ledger:header";
const BET_RECORD_PREFIX: &[u8] = b"bet:record:";

/// Archived view of one bet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRecord {
    pub bet: Bet,
    pub lots: Vec<PrizeLot>,
    /// Items already delivered, as (collection, item id)
    #[serde(default)]
    pub claimed_items: Vec<(Address, u64)>,
    pub status: BetStatus,
    pub updated_at: u64,
}

fn bet_record_key(bet_id: BetId) -> Vec<u8> {
    // Inverted id so a forward scan yields the newest bet first
    let inv_id = BetId::MAX - bet_id;
    let mut key = Vec::with_capacity(BET_RECORD_PREFIX.len() + 4);
    key.extend_from_slice(BET_RECORD_PREFIX);
    key.extend_from_slice(&inv_id.to_be_bytes());
    key
}

#[derive(Clone)]
pub struct LedgerStorage {
    db: Arc<DB>,
}

impl LedgerStorage {
    pub fn open(config: &StorageConfig) -> WagerResult<Self> {
        Self::open_with(&config.data_directory, config.write_buffer_size_mb, &config.compression_type)
    }

    /// Opens with default tuning
    pub fn open_path<P: AsRef<Path>>(path: P) -> WagerResult<Self> {
        Self::open_with(path, 128, &CompressionType::Lz4)
    }

    fn open_with<P: AsRef<Path>>(path: P, write_buffer_mb: usize, compression: &CompressionType) -> WagerResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(write_buffer_mb * 1024 * 1024);
        opts.set_max_write_buffer_number(4);
        opts.set_compression_type(match compression {
            CompressionType::None => rocksdb::DBCompressionType::None,
            CompressionType::Snappy => rocksdb::DBCompressionType::Snappy,
            CompressionType::Lz4 => rocksdb::DBCompressionType::Lz4,
            CompressionType::Zstd => rocksdb::DBCompressionType::Zstd,
        });

        let db = DB::open(&opts, path.as_ref()).map_err(|e| {
            StorageError::DatabaseOpenFailed(format!("{}: {}", path.as_ref().display(), e))
        })?;
        tracing::info!(path = %path.as_ref().display(), "ledger storage opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Writes the header and the touched bet records in one batch
    pub fn save<S: Serialize>(&self, snapshot: &S, records: &[BetRecord]) -> WagerResult<()> {
        let mut batch = WriteBatch::default();

        let bytes = serde_json::to_vec(snapshot)
            .map_err(|e| StorageError::WriteFailed(format!("Failed to encode ledger snapshot: {}", e)))?;
        batch.put(SNAPSHOT_KEY, bytes);

        for record in records {
            let bytes = serde_json::to_vec(record).map_err(|e| {
                StorageError::WriteFailed(format!("Failed to encode bet {}: {}", record.bet.id, e))
            })?;
            batch.put(bet_record_key(record.bet.id), bytes);
        }

        self.db
            .write(batch)
            .map_err(|e| StorageError::WriteFailed(e.to_string()).into())
    }

    pub fn load_snapshot<S: DeserializeOwned>(&self) -> WagerResult<Option<S>> {
        let Some(bytes) = self
            .db
            .get(SNAPSHOT_KEY)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?
        else {
            return Ok(None);
        };

        let snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::CorruptedData(format!("Failed to decode ledger snapshot: {}", e)))?;
        Ok(Some(snapshot))
    }

    pub fn load_bet(&self, bet_id: BetId) -> WagerResult<Option<BetRecord>> {
        let Some(bytes) = self
            .db
            .get(bet_record_key(bet_id))
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?
        else {
            return Ok(None);
        };

        let record = serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::CorruptedData(format!("Failed to decode bet {}: {}", bet_id, e))
        })?;
        Ok(Some(record))
    }

    /// Every archived bet, newest first
    pub fn all_bets(&self) -> WagerResult<Vec<BetRecord>> {
        self.recent_bets(usize::MAX)
    }

    /// Up to `limit` archived bets, newest first
    pub fn recent_bets(&self, limit: usize) -> WagerResult<Vec<BetRecord>> {
        let mut records = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(BET_RECORD_PREFIX, Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(BET_RECORD_PREFIX) || records.len() >= limit {
                break;
            }
            let record: BetRecord = serde_json::from_slice(&value)
                .map_err(|e| StorageError::CorruptedData(format!("Failed to decode bet record: {}", e)))?;
            records.push(record);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Asset;
    use tempfile::TempDir;

    fn bet(id: BetId) -> Bet {
        Bet {
            id,
            asset: Asset::Native,
            resolved: false,
            canceled: false,
            refunded: false,
            house_edge: 200,
            opponents: vec![],
            seats: vec![Address::from_low_u64(1)],
            request_id: None,
            requested_at: None,
            amount: 10,
            pot: 10,
            payout: 0,
            created_at: 5,
        }
    }

    fn record(id: BetId) -> BetRecord {
        let bet = bet(id);
        BetRecord {
            status: bet.status(),
            bet,
            lots: vec![],
            claimed_items: vec![],
            updated_at: 5,
        }
    }

    #[test]
    fn test_recent_bets_newest_first() {
        let dir = TempDir::new().unwrap();
        let storage = LedgerStorage::open_path(dir.path()).unwrap();

        storage.save(&"snapshot", &[record(1), record(2)]).unwrap();
        storage.save(&"snapshot", &[record(3)]).unwrap();

        let ids: Vec<BetId> = storage.recent_bets(10).unwrap().iter().map(|r| r.bet.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(storage.recent_bets(2).unwrap().len(), 2);
        assert_eq!(storage.load_bet(2).unwrap().unwrap().bet.id, 2);
        assert!(storage.load_bet(9).unwrap().is_none());
        assert_eq!(storage.all_bets().unwrap().len(), 3);
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = LedgerStorage::open_path(dir.path()).unwrap();
        let snapshot: Option<String> = storage.load_snapshot().unwrap();
        assert!(snapshot.is_none());
    }
}
