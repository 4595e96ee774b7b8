use alloy::{
    primitives::{Address, B256},
    rpc::types::Log,
    sol_types::SolEvent,
};

use super::{contract, EventKind};
use crate::{error::Error, provider::LogQuery};

/// Where a decoded event came from on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMeta {
    pub contract: Address,
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    /// Present when the node includes it in the log, saves a block lookup.
    pub block_timestamp: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Trade(contract::Trade),
    Liquidate(contract::Liquidate),
    UpdateMarginAccount(contract::UpdateMarginAccount),
    LiquidityAdded(contract::LiquidityAdded),
    LiquidityRemoved(contract::LiquidityRemoved),
    LiquidityWithdrawalInitiated(contract::LiquidityWithdrawalInitiated),
    SetOracles(contract::SetOracles),
    P2PTransfer(contract::P2PTransfer),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub meta: LogMeta,
    pub payload: EventPayload,
}

impl DecodedEvent {
    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Trade(_) => EventKind::Trade,
            EventPayload::Liquidate(_) => EventKind::Liquidate,
            EventPayload::UpdateMarginAccount(_) => {
                EventKind::UpdateMarginAccount
            },
            EventPayload::LiquidityAdded(_) => EventKind::LiquidityAdded,
            EventPayload::LiquidityRemoved(_) => EventKind::LiquidityRemoved,
            EventPayload::LiquidityWithdrawalInitiated(_) => {
                EventKind::LiquidityWithdrawalInitiated
            },
            EventPayload::SetOracles(_) => EventKind::SetOracles,
            EventPayload::P2PTransfer(_) => EventKind::P2PTransfer,
        }
    }
}

/// The tracked contracts: the perpetual manager emits every primary
/// event, each share token emits `P2PTransfer`.
#[derive(Debug, Clone)]
pub struct EventCatalog {
    pub perpetual_manager: Address,
    pub share_tokens: Vec<Address>,
}

impl EventCatalog {
    pub fn new(perpetual_manager: Address, share_tokens: Vec<Address>) -> Self {
        Self {
            perpetual_manager,
            share_tokens,
        }
    }

    /// Combined filter over the primary contract.
    pub fn primary_query(&self, kinds: &[EventKind]) -> LogQuery {
        LogQuery::new(
            vec![self.perpetual_manager],
            kinds
                .iter()
                .filter(|kind| kind.is_primary())
                .map(EventKind::topic)
                .collect(),
        )
    }

    pub fn transfer_query(&self, token: Address) -> LogQuery {
        LogQuery::new(vec![token], vec![EventKind::P2PTransfer.topic()])
    }

    /// Everything the live subscriber listens to.
    pub fn live_query(&self) -> LogQuery {
        let mut addresses = vec![self.perpetual_manager];
        addresses.extend(self.share_tokens.iter().copied());
        LogQuery::new(
            addresses,
            EventKind::ALL.iter().map(EventKind::topic).collect(),
        )
    }

    fn expects(&self, kind: EventKind, address: &Address) -> bool {
        if kind.is_primary() {
            *address == self.perpetual_manager
        } else {
            self.share_tokens.contains(address)
        }
    }

    /// Matches the primary topic against the catalogue and decodes the
    /// log. Every log is decoded on its own so one malformed entry never
    /// fails a batch.
    pub fn decode(&self, log: &Log) -> Result<DecodedEvent, Error> {
        let topic = log
            .topics()
            .first()
            .ok_or_else(|| Error::FieldNotExist(String::from("topic0")))?;
        let kind = EventKind::from_topic(topic)
            .ok_or_else(|| Error::UnknownTopic(format!("{topic}")))?;
        let address = log.address();

        if !self.expects(kind, &address) {
            return Err(Error::UnknownTopic(format!(
                "{} emitted by untracked contract {}",
                kind, address
            )));
        }

        let meta = LogMeta {
            contract: address,
            tx_hash: log
                .transaction_hash
                .ok_or_else(|| Error::FieldNotExist(String::from("transactionHash")))?,
            block_number: log
                .block_number
                .ok_or_else(|| Error::FieldNotExist(String::from("blockNumber")))?,
            log_index: log.log_index.unwrap_or_default(),
            block_timestamp: log.block_timestamp,
        };

        let data = &log.inner.data;
        let payload = match kind {
            EventKind::Trade => {
                EventPayload::Trade(contract::Trade::decode_log_data(data)?)
            },
            EventKind::Liquidate => EventPayload::Liquidate(
                contract::Liquidate::decode_log_data(data)?,
            ),
            EventKind::UpdateMarginAccount => {
                EventPayload::UpdateMarginAccount(
                    contract::UpdateMarginAccount::decode_log_data(data)?,
                )
            },
            EventKind::LiquidityAdded => EventPayload::LiquidityAdded(
                contract::LiquidityAdded::decode_log_data(data)?,
            ),
            EventKind::LiquidityRemoved => EventPayload::LiquidityRemoved(
                contract::LiquidityRemoved::decode_log_data(data)?,
            ),
            EventKind::LiquidityWithdrawalInitiated => {
                EventPayload::LiquidityWithdrawalInitiated(
                    contract::LiquidityWithdrawalInitiated::decode_log_data(
                        data,
                    )?,
                )
            },
            EventKind::SetOracles => EventPayload::SetOracles(
                contract::SetOracles::decode_log_data(data)?,
            ),
            EventKind::P2PTransfer => EventPayload::P2PTransfer(
                contract::P2PTransfer::decode_log_data(data)?,
            ),
        };

        Ok(DecodedEvent { meta, payload })
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, U256};

    use super::*;
    use crate::testing::{self, MANAGER, TOKEN_A};

    #[test]
    fn decodes_trade_from_manager() {
        let catalog = testing::catalog();
        let log = testing::trade_log(7, 3, 1);
        let event = catalog.decode(&log).unwrap();

        assert_eq!(event.kind(), EventKind::Trade);
        assert_eq!(event.meta.block_number, 7);
        assert_eq!(event.meta.contract, MANAGER);
        match event.payload {
            EventPayload::Trade(trade) => {
                assert_eq!(trade.trader, testing::trader(3));
                assert_eq!(trade.perpetualId.to::<u32>(), 100_001);
            },
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn rejects_truncated_data() {
        let catalog = testing::catalog();
        let log = testing::malformed_trade_log(9, 2);
        assert!(matches!(catalog.decode(&log), Err(Error::SolDecode(_))));
    }

    #[test]
    fn rejects_unknown_topic() {
        let catalog = testing::catalog();
        let mut log = testing::trade_log(7, 3, 1);
        log.inner.data = alloy::primitives::LogData::new_unchecked(
            vec![B256::repeat_byte(0xee)],
            Default::default(),
        );
        assert!(matches!(catalog.decode(&log), Err(Error::UnknownTopic(_))));
    }

    #[test]
    fn transfers_only_accepted_from_share_tokens() {
        let catalog = testing::catalog();
        let transfer = contract::P2PTransfer {
            from: testing::trader(1),
            to: testing::trader(2),
            amountD18: U256::from(5u64),
            priceD18: U256::from(1u64),
        };

        let from_token =
            testing::raw_log(TOKEN_A, transfer.encode_log_data(), 11, 1, 0);
        assert_eq!(
            catalog.decode(&from_token).unwrap().kind(),
            EventKind::P2PTransfer
        );

        let stranger = Address::repeat_byte(0x99);
        let elsewhere =
            testing::raw_log(stranger, transfer.encode_log_data(), 11, 1, 0);
        assert!(catalog.decode(&elsewhere).is_err());
    }

    #[test]
    fn live_query_covers_every_contract_and_topic() {
        let catalog = testing::catalog();
        let query = catalog.live_query();
        assert_eq!(query.addresses.len(), 1 + catalog.share_tokens.len());
        assert_eq!(query.topics.len(), EventKind::ALL.len());

        let primary = catalog.primary_query(&EventKind::ALL);
        assert_eq!(primary.topics.len(), EventKind::PRIMARY.len());
    }
}
