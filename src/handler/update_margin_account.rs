use chrono::{DateTime, Utc};

use crate::{
    error::Error,
    helpers::{address_string, hex_string, to_decimal},
    model::{Margin_Update, Record},
    types::{contract, LogMeta},
};

pub fn parse(
    meta: &LogMeta,
    item: &contract::UpdateMarginAccount,
    at: DateTime<Utc>,
    collected_live: bool,
) -> Result<Record, Error> {
    let update = Margin_Update {
        Tx_Hash: hex_string(&meta.tx_hash),
        MU_trader: address_string(&item.trader),
        MU_perpetual_id: item.perpetualId.to::<u32>().into(),
        MU_position_id: hex_string(&item.positionId),
        MU_position: to_decimal(item.fPositionBC),
        MU_cash: to_decimal(item.fCashCC),
        MU_locked_in_value: to_decimal(item.fLockedInValueQC),
        MU_funding_payment: to_decimal(item.fFundingPaymentCC),
        MU_open_interest: to_decimal(item.fOpenInterestBC),
        MU_block: i64::try_from(meta.block_number)?,
        MU_timestamp: at,
        MU_collected_live: collected_live,
    };

    Ok(Record::MarginUpdate(update))
}
