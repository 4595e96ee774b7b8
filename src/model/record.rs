use std::fmt;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};

use super::{
    EarningsType, Estimated_Earning, Liquidation, Liquidity_Withdrawal,
    Margin_Update, Oracle_Update, P2P_Transfer, Trade,
};

/// Stored state of a record with a given identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Only the live subscriber has delivered it so far.
    Live,
    /// A backfill pass has seen it.
    Confirmed,
}

impl Provenance {
    pub fn from_collected_live(collected_live: bool) -> Self {
        if collected_live {
            Provenance::Live
        } else {
            Provenance::Confirmed
        }
    }
}

/// Deduplication key. Two records of the same kind with equal keys are the
/// same on-chain occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Trade {
        tx_hash: String,
        trader: String,
    },
    Liquidation {
        id: String,
    },
    MarginUpdate {
        tx_hash: String,
        trader: String,
        perpetual_id: i64,
    },
    EstimatedEarning {
        tx_hash: String,
        user: String,
        earning_type: EarningsType,
    },
    LiquidityWithdrawal {
        tx_hash: String,
        user: String,
        is_removal: bool,
    },
    OracleUpdate {
        tx_hash: String,
        perpetual_id: i64,
    },
    P2PTransfer {
        tx_hash: String,
        token: String,
        from: String,
    },
}

/// A logical stream with its own resume cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HistoryStream {
    Trade,
    Liquidate,
    MarginAccountUpdated,
    WithdrawalInitiated,
    WithdrawalRemoved,
    EstimatedEarnings(EarningsType),
    OraclesSet,
    PeerTransfer(Address),
}

impl HistoryStream {
    /// Streams fed by the perpetual manager.
    pub const PRIMARY: [HistoryStream; 8] = [
        HistoryStream::Trade,
        HistoryStream::Liquidate,
        HistoryStream::MarginAccountUpdated,
        HistoryStream::WithdrawalInitiated,
        HistoryStream::WithdrawalRemoved,
        HistoryStream::EstimatedEarnings(EarningsType::LiquidityAdded),
        HistoryStream::EstimatedEarnings(EarningsType::LiquidityRemoved),
        HistoryStream::OraclesSet,
    ];
}

impl fmt::Display for HistoryStream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HistoryStream::Trade => write!(f, "Trade"),
            HistoryStream::Liquidate => write!(f, "Liquidate"),
            HistoryStream::MarginAccountUpdated => {
                write!(f, "MarginAccountUpdated")
            },
            HistoryStream::WithdrawalInitiated => {
                write!(f, "WithdrawalInitiated")
            },
            HistoryStream::WithdrawalRemoved => write!(f, "WithdrawalRemoved"),
            HistoryStream::EstimatedEarnings(kind) => {
                write!(f, "EstimatedEarnings/{}", kind)
            },
            HistoryStream::OraclesSet => write!(f, "OraclesSet"),
            HistoryStream::PeerTransfer(token) => {
                write!(f, "PeerTransfer/{:#x}", token)
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Trade(Trade),
    Liquidation(Liquidation),
    MarginUpdate(Margin_Update),
    EstimatedEarning(Estimated_Earning),
    LiquidityWithdrawal(Liquidity_Withdrawal),
    OracleUpdate(Oracle_Update),
    P2PTransfer(P2P_Transfer),
}

impl Record {
    pub fn identity(&self) -> IdentityKey {
        match self {
            Record::Trade(item) => IdentityKey::Trade {
                tx_hash: item.Tx_Hash.to_owned(),
                trader: item.TD_trader.to_owned(),
            },
            Record::Liquidation(item) => IdentityKey::Liquidation {
                id: item.LQ_id.to_owned(),
            },
            Record::MarginUpdate(item) => IdentityKey::MarginUpdate {
                tx_hash: item.Tx_Hash.to_owned(),
                trader: item.MU_trader.to_owned(),
                perpetual_id: item.MU_perpetual_id,
            },
            Record::EstimatedEarning(item) => IdentityKey::EstimatedEarning {
                tx_hash: item.Tx_Hash.to_owned(),
                user: item.EE_user.to_owned(),
                earning_type: item
                    .EE_type
                    .parse()
                    .unwrap_or(EarningsType::LiquidityAdded),
            },
            Record::LiquidityWithdrawal(item) => {
                IdentityKey::LiquidityWithdrawal {
                    tx_hash: item.Tx_Hash.to_owned(),
                    user: item.LW_user.to_owned(),
                    is_removal: item.LW_is_removal,
                }
            },
            Record::OracleUpdate(item) => IdentityKey::OracleUpdate {
                tx_hash: item.Tx_Hash.to_owned(),
                perpetual_id: item.OU_perpetual_id,
            },
            Record::P2PTransfer(item) => IdentityKey::P2PTransfer {
                tx_hash: item.Tx_Hash.to_owned(),
                token: item.PT_token.to_owned(),
                from: item.PT_from.to_owned(),
            },
        }
    }

    pub fn stream(&self) -> HistoryStream {
        match self {
            Record::Trade(_) => HistoryStream::Trade,
            Record::Liquidation(_) => HistoryStream::Liquidate,
            Record::MarginUpdate(_) => HistoryStream::MarginAccountUpdated,
            Record::EstimatedEarning(item) => HistoryStream::EstimatedEarnings(
                item.EE_type.parse().unwrap_or(EarningsType::LiquidityAdded),
            ),
            Record::LiquidityWithdrawal(item) => {
                if item.LW_is_removal {
                    HistoryStream::WithdrawalRemoved
                } else {
                    HistoryStream::WithdrawalInitiated
                }
            },
            Record::OracleUpdate(_) => HistoryStream::OraclesSet,
            Record::P2PTransfer(item) => HistoryStream::PeerTransfer(
                item.PT_token.parse().unwrap_or_default(),
            ),
        }
    }

    pub fn tx_hash(&self) -> &str {
        match self {
            Record::Trade(item) => &item.Tx_Hash,
            Record::Liquidation(item) => &item.Tx_Hash,
            Record::MarginUpdate(item) => &item.Tx_Hash,
            Record::EstimatedEarning(item) => &item.Tx_Hash,
            Record::LiquidityWithdrawal(item) => &item.Tx_Hash,
            Record::OracleUpdate(item) => &item.Tx_Hash,
            Record::P2PTransfer(item) => &item.Tx_Hash,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Record::Trade(item) => item.TD_timestamp,
            Record::Liquidation(item) => item.LQ_timestamp,
            Record::MarginUpdate(item) => item.MU_timestamp,
            Record::EstimatedEarning(item) => item.EE_timestamp,
            Record::LiquidityWithdrawal(item) => item.LW_timestamp,
            Record::OracleUpdate(item) => item.OU_timestamp,
            Record::P2PTransfer(item) => item.PT_timestamp,
        }
    }

    pub fn collected_live(&self) -> bool {
        match self {
            Record::Trade(item) => item.TD_collected_live,
            Record::Liquidation(item) => item.LQ_collected_live,
            Record::MarginUpdate(item) => item.MU_collected_live,
            Record::EstimatedEarning(item) => item.EE_collected_live,
            Record::LiquidityWithdrawal(item) => item.LW_collected_live,
            Record::OracleUpdate(item) => item.OU_collected_live,
            Record::P2PTransfer(item) => item.PT_collected_live,
        }
    }

    /// Marks the record as confirmed by backfill.
    pub fn confirm(&mut self) {
        match self {
            Record::Trade(item) => item.TD_collected_live = false,
            Record::Liquidation(item) => item.LQ_collected_live = false,
            Record::MarginUpdate(item) => item.MU_collected_live = false,
            Record::EstimatedEarning(item) => item.EE_collected_live = false,
            Record::LiquidityWithdrawal(item) => {
                item.LW_collected_live = false
            },
            Record::OracleUpdate(item) => item.OU_collected_live = false,
            Record::P2PTransfer(item) => item.PT_collected_live = false,
        }
    }
}
