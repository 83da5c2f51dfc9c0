//! Database schema definitions

pub const CREATE_BLOCKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    hash TEXT PRIMARY KEY,
    height INTEGER NOT NULL,
    parent_hash TEXT,
    timestamp INTEGER NOT NULL,
    size INTEGER NOT NULL,
    tx_ids TEXT NOT NULL,
    reward INTEGER NOT NULL,
    pool_name TEXT,
    pool_url TEXT,
    is_main_chain BOOLEAN NOT NULL
)
"#;

pub const CREATE_BLOCKS_HEIGHT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_blocks_height ON blocks(height)";

pub const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    txid TEXT PRIMARY KEY,
    block_hash TEXT NOT NULL,
    block_height INTEGER NOT NULL,
    block_time INTEGER NOT NULL,
    is_coinbase BOOLEAN NOT NULL,
    value_out INTEGER NOT NULL,
    fee INTEGER,
    inputs TEXT NOT NULL,
    outputs TEXT NOT NULL
)
"#;

pub const CREATE_TRANSACTIONS_HEIGHT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_transactions_block_height ON transactions(block_height)";

pub const CREATE_ADDRESSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS addresses (
    address TEXT PRIMARY KEY,
    balance INTEGER NOT NULL,
    total_received INTEGER NOT NULL,
    total_sent INTEGER NOT NULL,
    tx_appearances INTEGER NOT NULL,
    version INTEGER NOT NULL
)
"#;

// One row per applied balance event; the primary key is the idempotence key.
pub const CREATE_ADDRESS_DELTAS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS address_deltas (
    address TEXT NOT NULL,
    txid TEXT NOT NULL,
    kind TEXT NOT NULL,
    n INTEGER NOT NULL,
    value INTEGER NOT NULL,
    PRIMARY KEY (address, txid, kind, n)
)
"#;

pub const MIGRATIONS: &[&str] = &[
    CREATE_BLOCKS_TABLE,
    CREATE_BLOCKS_HEIGHT_INDEX,
    CREATE_TRANSACTIONS_TABLE,
    CREATE_TRANSACTIONS_HEIGHT_INDEX,
    CREATE_ADDRESSES_TABLE,
    CREATE_ADDRESS_DELTAS_TABLE,
];

pub const TABLES: &[&str] = &["address_deltas", "addresses", "transactions", "blocks"];
