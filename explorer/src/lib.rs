//! Viacoin block explorer backend
//!
//! Ingests blocks from a Viacoin node, maintains a per-address balance index
//! with pool attribution and block rewards, and serves it over a read-only
//! REST API.

pub mod api;
pub mod cli;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod indexer;
pub mod models;
pub mod rpc_client;

pub use config::Config;
pub use context::AppContext;
pub use error::{ExplorerError, Result};
