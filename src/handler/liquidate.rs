use chrono::{DateTime, Utc};

use crate::{
    error::Error,
    helpers::{address_string, hex_string, liquidation_id, to_decimal},
    model::{Liquidation, Record},
    types::{contract, LogMeta},
};

pub fn parse(
    meta: &LogMeta,
    item: &contract::Liquidate,
    at: DateTime<Utc>,
    collected_live: bool,
) -> Result<Record, Error> {
    let perpetual_id = item.perpetualId.to::<u32>();

    let liquidation = Liquidation {
        LQ_id: liquidation_id(
            &item.trader,
            perpetual_id,
            meta.block_number,
            item.amountLiquidatedBC,
        ),
        Tx_Hash: hex_string(&meta.tx_hash),
        LQ_trader: address_string(&item.trader),
        LQ_liquidator: address_string(&item.liquidator),
        LQ_perpetual_id: perpetual_id.into(),
        LQ_position_id: hex_string(&item.positionId),
        LQ_amount: to_decimal(item.amountLiquidatedBC),
        LQ_price: to_decimal(item.liquidationPrice),
        LQ_new_position_size: to_decimal(item.newPositionSizeBC),
        LQ_fee: to_decimal(item.fFeeCCY),
        LQ_realized_pnl: to_decimal(item.fPnlCCY),
        LQ_block: i64::try_from(meta.block_number)?,
        LQ_timestamp: at,
        LQ_collected_live: collected_live,
    };

    Ok(Record::Liquidation(liquidation))
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{aliases::U24, Address, FixedBytes, B256};

    use super::*;
    use crate::testing;

    fn liquidate(amount: i128) -> contract::Liquidate {
        contract::Liquidate {
            perpetualId: U24::from(100_002u32),
            liquidator: Address::repeat_byte(0x0b),
            trader: testing::trader(6),
            positionId: FixedBytes::<16>::repeat_byte(0x01),
            amountLiquidatedBC: amount,
            liquidationPrice: 2_000,
            newPositionSizeBC: 0,
            fFeeCCY: 3,
            fPnlCCY: -4,
        }
    }

    fn meta(tx_seed: u8) -> LogMeta {
        LogMeta {
            contract: testing::MANAGER,
            tx_hash: B256::repeat_byte(tx_seed),
            block_number: 77,
            log_index: 2,
            block_timestamp: None,
        }
    }

    #[test]
    fn same_liquidation_keeps_identity_across_transactions() {
        let at = testing::at(1);
        let first = parse(&meta(1), &liquidate(-7_000_123), at, true).unwrap();
        let second = parse(&meta(2), &liquidate(-7_000_123), at, false).unwrap();
        assert_eq!(first.identity(), second.identity());

        let different = parse(&meta(1), &liquidate(-7_000_124), at, true).unwrap();
        assert_ne!(first.identity(), different.identity());
    }
}
