//! Mining pool attribution from coinbase text

use std::path::Path;
use serde::Deserialize;
use tracing::warn;
use crate::error::{ExplorerError, Result};
use crate::models::{Attribution, PoolInfo};

/// Signature table shipped with the crate.
pub const BUNDLED_POOLS: &str = include_str!("../../pools.json");

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolSignature {
    #[serde(rename = "poolName")]
    pub pool_name: String,
    pub url: String,
    #[serde(rename = "searchStrings")]
    pub search_strings: Vec<String>,
}

/// Known pool signatures in file order. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct PoolRegistry {
    pools: Vec<PoolSignature>,
}

impl PoolRegistry {
    pub fn new(pools: Vec<PoolSignature>) -> Self {
        Self { pools }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let pools: Vec<PoolSignature> = serde_json::from_str(json)?;
        Ok(Self::new(pools))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExplorerError::Config(format!("Failed to read pools file {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// First pool (file order) with a search string contained in `coinbase_text`.
    pub fn resolve(&self, coinbase_text: &str) -> Attribution {
        for pool in &self.pools {
            if pool.search_strings.iter().any(|s| coinbase_text.contains(s.as_str())) {
                return Attribution::Pool(PoolInfo {
                    pool_name: pool.pool_name.clone(),
                    url: pool.url.clone(),
                });
            }
        }
        Attribution::Unknown
    }
}

/// Decodes the hex coinbase payload into text. Invalid hex yields an empty
/// string so the block simply stays unattributed.
pub fn parse_coinbase_text(coinbase_hex: &str) -> String {
    match hex::decode(coinbase_hex) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("Error decoding coinbase text: {}", e);
            String::new()
        }
    }
}
