use chrono::{DateTime, Utc};

use crate::{
    error::Error,
    helpers::{address_string, hex_string, u256_to_decimal},
    model::{EarningsType, Estimated_Earning, Liquidity_Withdrawal, Record},
    types::{contract, LogMeta},
};

/// A removal closes the withdrawal and books the realised earning.
pub fn parse(
    meta: &LogMeta,
    item: &contract::LiquidityRemoved,
    at: DateTime<Utc>,
    collected_live: bool,
) -> Result<[Record; 2], Error> {
    let tx_hash = hex_string(&meta.tx_hash);
    let user = address_string(&item.user);
    let block = i64::try_from(meta.block_number)?;
    let token_amount = u256_to_decimal(&item.tokenAmount)?;
    let share_amount = u256_to_decimal(&item.shareAmount)?;

    let earning = Estimated_Earning {
        Tx_Hash: tx_hash.to_owned(),
        EE_user: user.to_owned(),
        EE_pool_id: item.poolId.into(),
        EE_type: EarningsType::LiquidityRemoved.into(),
        EE_token_amount: token_amount.clone(),
        EE_share_amount: share_amount.clone(),
        EE_block: block,
        EE_timestamp: at,
        EE_collected_live: collected_live,
    };

    let withdrawal = Liquidity_Withdrawal {
        Tx_Hash: tx_hash,
        LW_user: user,
        LW_pool_id: item.poolId.into(),
        LW_share_amount: share_amount,
        LW_token_amount: Some(token_amount),
        LW_is_removal: true,
        LW_block: block,
        LW_timestamp: at,
        LW_collected_live: collected_live,
    };

    Ok([
        Record::EstimatedEarning(earning),
        Record::LiquidityWithdrawal(withdrawal),
    ])
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{B256, U256};

    use super::*;
    use crate::{model::HistoryStream, testing};

    #[test]
    fn feeds_earnings_and_withdrawal_streams() {
        let meta = LogMeta {
            contract: testing::MANAGER,
            tx_hash: B256::repeat_byte(0x21),
            block_number: 5,
            log_index: 0,
            block_timestamp: None,
        };
        let item = contract::LiquidityRemoved {
            poolId: 2,
            user: testing::trader(8),
            tokenAmount: U256::from(1_500u64),
            shareAmount: U256::from(1_000u64),
        };

        let [earning, withdrawal] =
            parse(&meta, &item, testing::at(2), false).unwrap();

        assert_eq!(
            earning.stream(),
            HistoryStream::EstimatedEarnings(EarningsType::LiquidityRemoved)
        );
        assert_eq!(withdrawal.stream(), HistoryStream::WithdrawalRemoved);
        assert_ne!(earning.identity(), withdrawal.identity());
    }
}
