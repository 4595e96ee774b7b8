use chrono::{DateTime, Utc};

use crate::{
    error::Error,
    helpers::{address_string, hex_string, to_decimal},
    model::{Record, Trade},
    types::{contract, LogMeta},
};

pub fn parse(
    meta: &LogMeta,
    item: &contract::Trade,
    at: DateTime<Utc>,
    collected_live: bool,
) -> Result<Record, Error> {
    let trade = Trade {
        Tx_Hash: hex_string(&meta.tx_hash),
        TD_trader: address_string(&item.trader),
        TD_perpetual_id: item.perpetualId.to::<u32>().into(),
        TD_position_id: hex_string(&item.positionId),
        TD_order_digest: hex_string(&item.orderDigest),
        TD_order_flags: item.order.flags.into(),
        TD_broker: address_string(&item.order.brokerAddr),
        TD_amount: to_decimal(item.order.fAmount),
        TD_new_position_size: to_decimal(item.newPositionSizeBC),
        TD_price: to_decimal(item.price),
        TD_fee: to_decimal(item.fFeeCCY),
        TD_realized_pnl: to_decimal(item.fPnlCCY),
        TD_b2c: to_decimal(item.fB2C),
        TD_block: i64::try_from(meta.block_number)?,
        TD_timestamp: at,
        TD_collected_live: collected_live,
    };

    Ok(Record::Trade(trade))
}
