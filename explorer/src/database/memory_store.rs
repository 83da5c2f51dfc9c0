//! In-process index store

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use async_trait::async_trait;
use parking_lot::RwLock;
use rpc_core::Hash;
use crate::database::{AddressUpdate, IndexStore};
use crate::error::{ExplorerError, Result};
use crate::models::{AddressIndexRecord, AddressTotals, BlockRecord, DeltaKey, TransactionRecord};

#[derive(Default)]
struct Tables {
    addresses: HashMap<String, AddressIndexRecord>,
    blocks: HashMap<Hash, BlockRecord>,
    heights: BTreeMap<u64, Vec<Hash>>,
    transactions: HashMap<Hash, TransactionRecord>,
}

/// Same semantics as the SQLite store, kept in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    injected_conflicts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` address upserts fail with a conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn address_records(&self) -> Vec<AddressIndexRecord> {
        let mut records: Vec<_> = self.tables.read().addresses.values().cloned().collect();
        records.sort_by(|a, b| a.address.cmp(&b.address));
        records
    }

    pub fn block_count(&self) -> usize {
        self.tables.read().blocks.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.tables.read().transactions.len()
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn get_address_record(&self, address: &str) -> Result<Option<AddressIndexRecord>> {
        Ok(self.tables.read().addresses.get(address).cloned())
    }

    async fn get_address_totals(&self, address: &str) -> Result<Option<AddressTotals>> {
        Ok(self.tables.read().addresses.get(address).map(AddressIndexRecord::totals))
    }

    async fn has_address_delta(&self, address: &str, key: &DeltaKey) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .addresses
            .get(address)
            .is_some_and(|r| r.has_applied(key)))
    }

    async fn has_address_transaction(&self, address: &str, txid: &Hash) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .addresses
            .get(address)
            .is_some_and(|r| r.transactions.contains(txid)))
    }

    async fn upsert_address_record(&self, update: &AddressUpdate) -> Result<u64> {
        let totals = &update.totals;
        let address = &totals.address;
        if self.take_injected_conflict() {
            return Err(ExplorerError::PersistenceConflict(format!("{}: injected", address)));
        }

        let mut tables = self.tables.write();
        let stored_version = tables.addresses.get(address).map(|r| r.version);
        if stored_version != update.expected_version {
            return Err(ExplorerError::PersistenceConflict(format!(
                "{} expected version {:?}, found {:?}",
                address, update.expected_version, stored_version
            )));
        }

        let record = tables
            .addresses
            .entry(address.clone())
            .or_insert_with(|| AddressIndexRecord::new(address.as_str()));
        if record.has_applied(&update.delta.key()) {
            return Err(ExplorerError::PersistenceConflict(format!(
                "{} already recorded {} {}",
                address,
                update.delta.kind.as_str(),
                update.delta.txid
            )));
        }
        record.applied.insert(update.delta.key());
        record.transactions.insert(update.delta.txid);
        record.balance = totals.balance;
        record.total_received = totals.total_received;
        record.total_sent = totals.total_sent;
        record.tx_appearances = totals.tx_appearances;
        record.version += 1;
        Ok(record.version)
    }

    async fn put_block_record(&self, record: &BlockRecord) -> Result<()> {
        let mut tables = self.tables.write();
        let hashes = tables.heights.entry(record.height).or_default();
        if !hashes.contains(&record.hash) {
            hashes.push(record.hash);
        }
        tables.blocks.insert(record.hash, record.clone());
        Ok(())
    }

    async fn put_transaction_record(&self, record: &TransactionRecord) -> Result<()> {
        self.tables
            .write()
            .transactions
            .entry(record.txid)
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn get_block_record(&self, hash: &Hash) -> Result<Option<BlockRecord>> {
        Ok(self.tables.read().blocks.get(hash).cloned())
    }

    async fn get_block_record_by_height(&self, height: u64) -> Result<Option<BlockRecord>> {
        let tables = self.tables.read();
        let Some(hashes) = tables.heights.get(&height) else {
            return Ok(None);
        };
        let mut candidates: Vec<&BlockRecord> =
            hashes.iter().filter_map(|h| tables.blocks.get(h)).collect();
        candidates.sort_by_key(|b| !b.is_main_chain);
        Ok(candidates.first().map(|b| (*b).clone()))
    }

    async fn get_transaction_record(&self, txid: &Hash) -> Result<Option<TransactionRecord>> {
        Ok(self.tables.read().transactions.get(txid).cloned())
    }

    async fn latest_block_height(&self) -> Result<Option<u64>> {
        Ok(self.tables.read().heights.keys().next_back().copied())
    }

    async fn first_missing_height(&self, from: u64) -> Result<u64> {
        let tables = self.tables.read();
        let mut next = from;
        for height in tables.heights.range(from..).map(|(h, _)| *h) {
            if height != next {
                break;
            }
            next += 1;
        }
        Ok(next)
    }

    async fn drop_all(&self) -> Result<()> {
        *self.tables.write() = Tables::default();
        Ok(())
    }
}
