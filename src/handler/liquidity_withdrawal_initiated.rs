use chrono::{DateTime, Utc};

use crate::{
    error::Error,
    helpers::{address_string, hex_string, u256_to_decimal},
    model::{Liquidity_Withdrawal, Record},
    types::{contract, LogMeta},
};

pub fn parse(
    meta: &LogMeta,
    item: &contract::LiquidityWithdrawalInitiated,
    at: DateTime<Utc>,
    collected_live: bool,
) -> Result<Record, Error> {
    let withdrawal = Liquidity_Withdrawal {
        Tx_Hash: hex_string(&meta.tx_hash),
        LW_user: address_string(&item.user),
        LW_pool_id: item.poolId.into(),
        LW_share_amount: u256_to_decimal(&item.shareAmount)?,
        LW_token_amount: None,
        LW_is_removal: false,
        LW_block: i64::try_from(meta.block_number)?,
        LW_timestamp: at,
        LW_collected_live: collected_live,
    };

    Ok(Record::LiquidityWithdrawal(withdrawal))
}
