//! Block subsidy schedule

use serde::{Deserialize, Serialize};
use crate::models::COIN;

/// Halving schedule of one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsidyParams {
    pub base_subsidy: i64,
    pub halving_interval: u64,
    /// Blocks below this height carry no subsidy.
    pub zero_reward_height: u64,
}

impl SubsidyParams {
    pub const fn mainnet() -> Self {
        Self {
            base_subsidy: 20 * COIN,
            halving_interval: 657_000,
            zero_reward_height: 10_001,
        }
    }

    pub const fn testnet() -> Self {
        Self {
            base_subsidy: 20 * COIN,
            halving_interval: 657_000,
            zero_reward_height: 2_001,
        }
    }

    pub const fn for_network(is_main_chain: bool) -> Self {
        if is_main_chain {
            Self::mainnet()
        } else {
            Self::testnet()
        }
    }

    pub fn subsidy_at(&self, height: u64) -> i64 {
        if height < self.zero_reward_height || self.halving_interval == 0 {
            return 0;
        }
        let halvings = height / self.halving_interval;
        if halvings >= 64 {
            return 0;
        }
        self.base_subsidy >> halvings
    }
}

/// Subsidy a block at `height` is entitled to. Defined for every height.
pub fn calc_subsidy(height: u64, is_main_chain: bool) -> i64 {
    SubsidyParams::for_network(is_main_chain).subsidy_at(height)
}
