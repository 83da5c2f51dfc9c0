//! Block ingestion and address indexing

pub mod address_indexer;
pub mod block_indexer;
pub mod chain_tracker;
pub mod converter;
pub mod follower;
pub mod notifier;
pub mod pools;
pub mod service;
pub mod subsidy;

pub use address_indexer::AddressIndexer;
pub use follower::{BlockRef, Follower, RetryPolicy};
pub use notifier::{BlockNotifier, PollingNotifier};
pub use service::{IngestReport, IngestionService};
