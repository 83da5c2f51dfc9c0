//! SQLite-backed index store

use std::sync::Arc;
use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};
use rpc_core::Hash;
use crate::database::schema::TABLES;
use crate::database::{AddressUpdate, Database, IndexStore};
use crate::error::{ExplorerError, Result};
use crate::models::{
    AddressIndexRecord, AddressTotals, BlockRecord, DeltaKey, DeltaKind, PoolInfo,
    TransactionRecord,
};

pub struct SqliteStore {
    database: Arc<Database>,
}

impl SqliteStore {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    fn pool(&self) -> &sqlx::SqlitePool {
        self.database.pool()
    }
}

fn parse_hash(s: &str) -> Result<Hash> {
    s.parse()
        .map_err(|e| ExplorerError::Internal(format!("Corrupt hash {:?} in database: {}", s, e)))
}

/// Unique-key violations and SQLite BUSY both mean another writer got there
/// first; the caller re-reads and retries.
fn conflict_or(err: sqlx::Error, what: &str) -> ExplorerError {
    if let sqlx::Error::Database(db_err) = &err {
        let busy = matches!(db_err.code().as_deref(), Some("5") | Some("517"));
        if db_err.is_unique_violation() || busy {
            return ExplorerError::PersistenceConflict(format!("{}: {}", what, db_err));
        }
    }
    ExplorerError::Database(err)
}

fn block_from_row(row: &SqliteRow) -> Result<BlockRecord> {
    let hash: String = row.try_get("hash")?;
    let parent_hash: Option<String> = row.try_get("parent_hash")?;
    let tx_ids: String = row.try_get("tx_ids")?;
    let pool_name: Option<String> = row.try_get("pool_name")?;
    let pool_url: Option<String> = row.try_get("pool_url")?;

    Ok(BlockRecord {
        hash: parse_hash(&hash)?,
        height: row.try_get::<i64, _>("height")? as u64,
        parent_hash: parent_hash.as_deref().map(parse_hash).transpose()?,
        timestamp: row.try_get("timestamp")?,
        size: row.try_get::<i64, _>("size")? as u64,
        tx_ids: serde_json::from_str(&tx_ids)?,
        reward: row.try_get("reward")?,
        pool: match (pool_name, pool_url) {
            (Some(pool_name), Some(url)) => Some(PoolInfo { pool_name, url }),
            _ => None,
        },
        is_main_chain: row.try_get("is_main_chain")?,
    })
}

fn transaction_from_row(row: &SqliteRow) -> Result<TransactionRecord> {
    let txid: String = row.try_get("txid")?;
    let block_hash: String = row.try_get("block_hash")?;
    let inputs: String = row.try_get("inputs")?;
    let outputs: String = row.try_get("outputs")?;

    Ok(TransactionRecord {
        txid: parse_hash(&txid)?,
        block_height: row.try_get::<i64, _>("block_height")? as u64,
        block_hash: parse_hash(&block_hash)?,
        block_time: row.try_get("block_time")?,
        is_coinbase: row.try_get("is_coinbase")?,
        inputs: serde_json::from_str(&inputs)?,
        outputs: serde_json::from_str(&outputs)?,
        value_out: row.try_get("value_out")?,
        fee: row.try_get("fee")?,
    })
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn get_address_record(&self, address: &str) -> Result<Option<AddressIndexRecord>> {
        // Both reads see the same snapshot.
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query(
            r#"
            SELECT address, balance, total_received, total_sent, tx_appearances, version
            FROM addresses
            WHERE address = ?
            "#,
        )
        .bind(address)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let mut record = AddressIndexRecord::new(address);
        record.balance = row.try_get("balance")?;
        record.total_received = row.try_get("total_received")?;
        record.total_sent = row.try_get("total_sent")?;
        record.tx_appearances = row.try_get::<i64, _>("tx_appearances")? as u64;
        record.version = row.try_get::<i64, _>("version")? as u64;

        let deltas = sqlx::query("SELECT txid, kind, n FROM address_deltas WHERE address = ?")
            .bind(address)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        for delta in deltas {
            let txid = parse_hash(&delta.try_get::<String, _>("txid")?)?;
            let kind: String = delta.try_get("kind")?;
            let kind = DeltaKind::parse(&kind)
                .ok_or_else(|| ExplorerError::Internal(format!("Unknown delta kind {:?}", kind)))?;
            let n = delta.try_get::<i64, _>("n")? as u32;
            record.transactions.insert(txid);
            record.applied.insert(DeltaKey { txid, kind, n });
        }

        Ok(Some(record))
    }

    async fn get_address_totals(&self, address: &str) -> Result<Option<AddressTotals>> {
        let row = sqlx::query(
            r#"
            SELECT balance, total_received, total_sent, tx_appearances, version
            FROM addresses
            WHERE address = ?
            "#,
        )
        .bind(address)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(AddressTotals {
            address: address.to_string(),
            balance: row.try_get("balance")?,
            total_received: row.try_get("total_received")?,
            total_sent: row.try_get("total_sent")?,
            tx_appearances: row.try_get::<i64, _>("tx_appearances")? as u64,
            version: row.try_get::<i64, _>("version")? as u64,
        }))
    }

    async fn has_address_delta(&self, address: &str, key: &DeltaKey) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM address_deltas WHERE address = ? AND txid = ? AND kind = ? AND n = ?",
        )
        .bind(address)
        .bind(key.txid.to_string())
        .bind(key.kind.as_str())
        .bind(key.n as i64)
        .fetch_optional(self.pool())
        .await?;
        Ok(found.is_some())
    }

    async fn has_address_transaction(&self, address: &str, txid: &Hash) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM address_deltas WHERE address = ? AND txid = ? LIMIT 1",
        )
        .bind(address)
        .bind(txid.to_string())
        .fetch_optional(self.pool())
        .await?;
        Ok(found.is_some())
    }

    async fn upsert_address_record(&self, update: &AddressUpdate) -> Result<u64> {
        let record = &update.totals;
        let address = record.address.as_str();
        let mut tx = self.pool().begin().await?;

        let new_version = match update.expected_version {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO addresses (
                        address, balance, total_received, total_sent, tx_appearances, version
                    ) VALUES (?, ?, ?, ?, ?, 1)
                    "#,
                )
                .bind(address)
                .bind(record.balance)
                .bind(record.total_received)
                .bind(record.total_sent)
                .bind(record.tx_appearances as i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| conflict_or(e, address))?;
                1
            }
            Some(expected) => {
                let result = sqlx::query(
                    r#"
                    UPDATE addresses
                    SET balance = ?, total_received = ?, total_sent = ?,
                        tx_appearances = ?, version = version + 1
                    WHERE address = ? AND version = ?
                    "#,
                )
                .bind(record.balance)
                .bind(record.total_received)
                .bind(record.total_sent)
                .bind(record.tx_appearances as i64)
                .bind(address)
                .bind(expected as i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| conflict_or(e, address))?;

                if result.rows_affected() == 0 {
                    tx.rollback().await?;
                    return Err(ExplorerError::PersistenceConflict(format!(
                        "{} changed since version {}",
                        address, expected
                    )));
                }
                expected + 1
            }
        };

        let delta = &update.delta;
        sqlx::query(
            r#"
            INSERT INTO address_deltas (address, txid, kind, n, value)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(address)
        .bind(delta.txid.to_string())
        .bind(delta.kind.as_str())
        .bind(delta.n as i64)
        .bind(delta.value)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or(e, address))?;

        tx.commit().await.map_err(|e| conflict_or(e, address))?;
        Ok(new_version)
    }

    async fn put_block_record(&self, record: &BlockRecord) -> Result<()> {
        let (pool_name, pool_url) = match &record.pool {
            Some(pool) => (Some(pool.pool_name.as_str()), Some(pool.url.as_str())),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO blocks (
                hash, height, parent_hash, timestamp, size, tx_ids,
                reward, pool_name, pool_url, is_main_chain
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (hash) DO UPDATE SET
                reward = excluded.reward,
                pool_name = excluded.pool_name,
                pool_url = excluded.pool_url,
                is_main_chain = excluded.is_main_chain
            "#,
        )
        .bind(record.hash.to_string())
        .bind(record.height as i64)
        .bind(record.parent_hash.map(|h| h.to_string()))
        .bind(record.timestamp)
        .bind(record.size as i64)
        .bind(serde_json::to_string(&record.tx_ids)?)
        .bind(record.reward)
        .bind(pool_name)
        .bind(pool_url)
        .bind(record.is_main_chain)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn put_transaction_record(&self, record: &TransactionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                txid, block_hash, block_height, block_time, is_coinbase,
                value_out, fee, inputs, outputs
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (txid) DO NOTHING
            "#,
        )
        .bind(record.txid.to_string())
        .bind(record.block_hash.to_string())
        .bind(record.block_height as i64)
        .bind(record.block_time)
        .bind(record.is_coinbase)
        .bind(record.value_out)
        .bind(record.fee)
        .bind(serde_json::to_string(&record.inputs)?)
        .bind(serde_json::to_string(&record.outputs)?)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn get_block_record(&self, hash: &Hash) -> Result<Option<BlockRecord>> {
        let row = sqlx::query("SELECT * FROM blocks WHERE hash = ?")
            .bind(hash.to_string())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(block_from_row).transpose()
    }

    async fn get_block_record_by_height(&self, height: u64) -> Result<Option<BlockRecord>> {
        let row = sqlx::query(
            "SELECT * FROM blocks WHERE height = ? ORDER BY is_main_chain DESC LIMIT 1",
        )
        .bind(height as i64)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(block_from_row).transpose()
    }

    async fn get_transaction_record(&self, txid: &Hash) -> Result<Option<TransactionRecord>> {
        let row = sqlx::query("SELECT * FROM transactions WHERE txid = ?")
            .bind(txid.to_string())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn latest_block_height(&self) -> Result<Option<u64>> {
        let height: Option<i64> = sqlx::query_scalar("SELECT MAX(height) FROM blocks")
            .fetch_one(self.pool())
            .await?;
        Ok(height.map(|h| h as u64))
    }

    async fn first_missing_height(&self, from: u64) -> Result<u64> {
        let present: Option<i64> = sqlx::query_scalar("SELECT 1 FROM blocks WHERE height = ? LIMIT 1")
            .bind(from as i64)
            .fetch_optional(self.pool())
            .await?;
        if present.is_none() {
            return Ok(from);
        }

        // Last height of the run starting at `from`, plus one.
        let gap: i64 = sqlx::query_scalar(
            r#"
            SELECT MIN(b.height) + 1
            FROM blocks b
            WHERE b.height >= ?
              AND NOT EXISTS (SELECT 1 FROM blocks c WHERE c.height = b.height + 1)
            "#,
        )
        .bind(from as i64)
        .fetch_one(self.pool())
        .await?;
        Ok(gap as u64)
    }

    async fn drop_all(&self) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        for table in TABLES {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
