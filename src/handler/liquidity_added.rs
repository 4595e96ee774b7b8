use chrono::{DateTime, Utc};

use crate::{
    error::Error,
    helpers::{address_string, hex_string, u256_to_decimal},
    model::{EarningsType, Estimated_Earning, Record},
    types::{contract, LogMeta},
};

pub fn parse(
    meta: &LogMeta,
    item: &contract::LiquidityAdded,
    at: DateTime<Utc>,
    collected_live: bool,
) -> Result<Record, Error> {
    let earning = Estimated_Earning {
        Tx_Hash: hex_string(&meta.tx_hash),
        EE_user: address_string(&item.user),
        EE_pool_id: item.poolId.into(),
        EE_type: EarningsType::LiquidityAdded.into(),
        EE_token_amount: u256_to_decimal(&item.tokenAmount)?,
        EE_share_amount: u256_to_decimal(&item.shareAmount)?,
        EE_block: i64::try_from(meta.block_number)?,
        EE_timestamp: at,
        EE_collected_live: collected_live,
    };

    Ok(Record::EstimatedEarning(earning))
}
