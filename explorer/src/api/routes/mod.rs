pub mod addresses;
pub mod blocks;
pub mod status;
pub mod transactions;
