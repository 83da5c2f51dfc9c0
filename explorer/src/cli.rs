use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "via-explorer")]
#[command(about = "Viacoin block explorer indexer", long_about = None)]
pub struct Args {
    /// Path to configuration file (optional, uses defaults if not provided)
    #[arg(short, long)]
    pub config_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Node JSON-RPC endpoint
    #[arg(long)]
    pub rpc_url: Option<String>,

    /// Chain the node must report (main, test, regtest)
    #[arg(long)]
    pub chain: Option<String>,

    /// SQLite database file
    #[arg(long)]
    pub database_path: Option<PathBuf>,

    /// Pool signature file
    #[arg(long)]
    pub pools_file: Option<PathBuf>,

    /// Query API port
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Disable the query API
    #[arg(long)]
    pub no_api: bool,

    /// First height to index
    #[arg(long)]
    pub start_height: Option<u64>,

    /// Keep the index in memory instead of SQLite
    #[arg(long)]
    pub memory: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Follow the node and index new blocks as they arrive
    Run,
    /// Drop the index and rebuild it from the start height up to the tip
    Rebuild,
    /// Index a single block by height
    Ingest {
        height: u64,
    },
}

pub fn parse_args() -> Args {
    Args::parse()
}
