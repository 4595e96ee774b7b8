use chrono::{DateTime, Utc};

use crate::{
    error::Error,
    helpers::{address_string, hex_string, u256_to_decimal},
    model::{P2P_Transfer, Record},
    types::{contract, LogMeta},
};

/// The emitting share token is part of the identity, the same transaction
/// may move shares of several pools.
pub fn parse(
    meta: &LogMeta,
    item: &contract::P2PTransfer,
    at: DateTime<Utc>,
    collected_live: bool,
) -> Result<Record, Error> {
    let transfer = P2P_Transfer {
        Tx_Hash: hex_string(&meta.tx_hash),
        PT_token: address_string(&meta.contract),
        PT_from: address_string(&item.from),
        PT_to: address_string(&item.to),
        PT_amount: u256_to_decimal(&item.amountD18)?,
        PT_price: u256_to_decimal(&item.priceD18)?,
        PT_block: i64::try_from(meta.block_number)?,
        PT_timestamp: at,
        PT_collected_live: collected_live,
    };

    Ok(Record::P2PTransfer(transfer))
}
