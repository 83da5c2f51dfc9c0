//! Conversion of node transactions into index records and address deltas

use std::collections::HashMap;
use rpc_core::{Hash, TxData};
use crate::error::{ExplorerError, Result};
use crate::models::{
    coin_to_sat, AddressDelta, DeltaKind, TransactionRecord, TxInputRecord, TxOutputRecord,
};

/// An output referenced by some input, with its value already in base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutput {
    pub addresses: Vec<String>,
    pub value: i64,
}

pub type PrevoutMap = HashMap<(Hash, u32), ResolvedOutput>;

/// Where the transaction was mined.
#[derive(Debug, Clone, Copy)]
pub struct BlockContext {
    pub height: u64,
    pub hash: Hash,
    pub time: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedTx {
    pub record: TransactionRecord,
    pub deltas: Vec<AddressDelta>,
}

/// Resolved outputs created by `tx`, keyed the way inputs reference them.
pub fn outputs_of(tx: &TxData) -> impl Iterator<Item = ((Hash, u32), ResolvedOutput)> + '_ {
    tx.vout.iter().map(move |vout| {
        (
            (tx.txid, vout.n),
            ResolvedOutput {
                addresses: vout.script_pub_key.all_addresses(),
                value: coin_to_sat(vout.value),
            },
        )
    })
}

/// Pure conversion; every non-coinbase input must have its prevout in `prevouts`.
pub fn convert_transaction(
    tx: &TxData,
    block: &BlockContext,
    prevouts: &PrevoutMap,
) -> Result<ConvertedTx> {
    let is_coinbase = tx.is_coinbase();
    let mut deltas = Vec::new();

    let mut inputs = Vec::with_capacity(tx.vin.len());
    for (n, vin) in tx.vin.iter().enumerate() {
        let n = n as u32;
        let Some((prev_txid, prev_vout)) = vin.prevout() else {
            inputs.push(TxInputRecord {
                n,
                coinbase: vin.coinbase.clone(),
                prev_txid: None,
                prev_vout: None,
                addresses: Vec::new(),
                value: 0,
            });
            continue;
        };

        let spent = prevouts.get(&(prev_txid, prev_vout)).ok_or_else(|| {
            ExplorerError::NotFound(format!(
                "prevout {}:{} spent by {}",
                prev_txid, prev_vout, tx.txid
            ))
        })?;

        for address in &spent.addresses {
            deltas.push(AddressDelta {
                address: address.clone(),
                txid: tx.txid,
                kind: DeltaKind::Spend,
                n,
                value: spent.value,
                is_coinbase_input: false,
            });
        }

        inputs.push(TxInputRecord {
            n,
            coinbase: None,
            prev_txid: Some(prev_txid),
            prev_vout: Some(prev_vout),
            addresses: spent.addresses.clone(),
            value: spent.value,
        });
    }

    let mut outputs = Vec::with_capacity(tx.vout.len());
    for vout in &tx.vout {
        let value = coin_to_sat(vout.value);
        let addresses = vout.script_pub_key.all_addresses();
        for address in &addresses {
            deltas.push(AddressDelta {
                address: address.clone(),
                txid: tx.txid,
                kind: DeltaKind::Receipt,
                n: vout.n,
                value,
                is_coinbase_input: is_coinbase,
            });
        }
        outputs.push(TxOutputRecord {
            n: vout.n,
            addresses,
            value,
            script_type: vout.script_pub_key.script_type.clone(),
        });
    }

    let value_out: i64 = outputs.iter().map(|o| o.value).sum();
    let fee = if is_coinbase {
        None
    } else {
        let value_in: i64 = inputs.iter().map(|i| i.value).sum();
        Some(value_in - value_out)
    };

    Ok(ConvertedTx {
        record: TransactionRecord {
            txid: tx.txid,
            block_height: block.height,
            block_hash: block.hash,
            block_time: block.time,
            is_coinbase,
            inputs,
            outputs,
            value_out,
            fee,
        },
        deltas,
    })
}
