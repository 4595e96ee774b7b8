use std::{fmt, io, str::FromStr};

use alloy::{primitives::B256, sol_types::SolEvent};

use super::contract;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Trade,
    Liquidate,
    UpdateMarginAccount,
    LiquidityAdded,
    LiquidityRemoved,
    LiquidityWithdrawalInitiated,
    SetOracles,
    P2PTransfer,
}

impl EventKind {
    /// Events emitted by the perpetual manager.
    pub const PRIMARY: [EventKind; 7] = [
        EventKind::Trade,
        EventKind::Liquidate,
        EventKind::UpdateMarginAccount,
        EventKind::LiquidityAdded,
        EventKind::LiquidityRemoved,
        EventKind::LiquidityWithdrawalInitiated,
        EventKind::SetOracles,
    ];

    pub const ALL: [EventKind; 8] = [
        EventKind::Trade,
        EventKind::Liquidate,
        EventKind::UpdateMarginAccount,
        EventKind::LiquidityAdded,
        EventKind::LiquidityRemoved,
        EventKind::LiquidityWithdrawalInitiated,
        EventKind::SetOracles,
        EventKind::P2PTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Trade => "Trade",
            EventKind::Liquidate => "Liquidate",
            EventKind::UpdateMarginAccount => "UpdateMarginAccount",
            EventKind::LiquidityAdded => "LiquidityAdded",
            EventKind::LiquidityRemoved => "LiquidityRemoved",
            EventKind::LiquidityWithdrawalInitiated => {
                "LiquidityWithdrawalInitiated"
            },
            EventKind::SetOracles => "SetOracles",
            EventKind::P2PTransfer => "P2PTransfer",
        }
    }

    /// Signature hash matched against `topics[0]` of a log.
    pub fn topic(&self) -> B256 {
        match self {
            EventKind::Trade => contract::Trade::SIGNATURE_HASH,
            EventKind::Liquidate => contract::Liquidate::SIGNATURE_HASH,
            EventKind::UpdateMarginAccount => {
                contract::UpdateMarginAccount::SIGNATURE_HASH
            },
            EventKind::LiquidityAdded => {
                contract::LiquidityAdded::SIGNATURE_HASH
            },
            EventKind::LiquidityRemoved => {
                contract::LiquidityRemoved::SIGNATURE_HASH
            },
            EventKind::LiquidityWithdrawalInitiated => {
                contract::LiquidityWithdrawalInitiated::SIGNATURE_HASH
            },
            EventKind::SetOracles => contract::SetOracles::SIGNATURE_HASH,
            EventKind::P2PTransfer => contract::P2PTransfer::SIGNATURE_HASH,
        }
    }

    pub fn from_topic(topic: &B256) -> Option<EventKind> {
        EventKind::ALL.into_iter().find(|kind| kind.topic() == *topic)
    }

    pub fn is_primary(&self) -> bool {
        !matches!(self, EventKind::P2PTransfer)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<EventKind, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| io::Error::other("Event kind not supported"))
    }
}
