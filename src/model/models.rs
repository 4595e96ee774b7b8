//! Persisted history records.
//!
//! Amount columns hold the raw on-chain fixed-point integers, conversion
//! to floating values is left to readers of the store. Every record carries
//! a `*_collected_live` flag: `true` while only the live subscriber has seen
//! it, `false` once a backfill pass confirmed it.

use std::{fmt, io, str::FromStr};

use chrono::{DateTime, Utc};
use sqlx::{types::BigDecimal, FromRow};

// -----------------------------------------------------------------------------
// Trading
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Trade {
    pub Tx_Hash: String,
    pub TD_trader: String,
    pub TD_perpetual_id: i64,
    pub TD_position_id: String,
    pub TD_order_digest: String,
    pub TD_order_flags: i64,
    pub TD_broker: String,
    pub TD_amount: BigDecimal,
    pub TD_new_position_size: BigDecimal,
    pub TD_price: BigDecimal,
    pub TD_fee: BigDecimal,
    pub TD_realized_pnl: BigDecimal,
    pub TD_b2c: BigDecimal,
    pub TD_block: i64,
    pub TD_timestamp: DateTime<Utc>,
    pub TD_collected_live: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Liquidation {
    /// Derived identity, liquidations carry no natural unique key.
    pub LQ_id: String,
    pub Tx_Hash: String,
    pub LQ_trader: String,
    pub LQ_liquidator: String,
    pub LQ_perpetual_id: i64,
    pub LQ_position_id: String,
    pub LQ_amount: BigDecimal,
    pub LQ_price: BigDecimal,
    pub LQ_new_position_size: BigDecimal,
    pub LQ_fee: BigDecimal,
    pub LQ_realized_pnl: BigDecimal,
    pub LQ_block: i64,
    pub LQ_timestamp: DateTime<Utc>,
    pub LQ_collected_live: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Margin_Update {
    pub Tx_Hash: String,
    pub MU_trader: String,
    pub MU_perpetual_id: i64,
    pub MU_position_id: String,
    pub MU_position: BigDecimal,
    pub MU_cash: BigDecimal,
    pub MU_locked_in_value: BigDecimal,
    pub MU_funding_payment: BigDecimal,
    pub MU_open_interest: BigDecimal,
    pub MU_block: i64,
    pub MU_timestamp: DateTime<Utc>,
    pub MU_collected_live: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Oracle_Update {
    pub Tx_Hash: String,
    pub OU_perpetual_id: i64,
    pub OU_base_quote_s2: String,
    pub OU_base_quote_s3: String,
    pub OU_block: i64,
    pub OU_timestamp: DateTime<Utc>,
    pub OU_collected_live: bool,
}

// -----------------------------------------------------------------------------
// Liquidity
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Estimated_Earning {
    pub Tx_Hash: String,
    pub EE_user: String,
    pub EE_pool_id: i16,
    pub EE_type: String,
    pub EE_token_amount: BigDecimal,
    pub EE_share_amount: BigDecimal,
    pub EE_block: i64,
    pub EE_timestamp: DateTime<Utc>,
    pub EE_collected_live: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Liquidity_Withdrawal {
    pub Tx_Hash: String,
    pub LW_user: String,
    pub LW_pool_id: i16,
    pub LW_share_amount: BigDecimal,
    /// Only known once the withdrawal is executed.
    pub LW_token_amount: Option<BigDecimal>,
    pub LW_is_removal: bool,
    pub LW_block: i64,
    pub LW_timestamp: DateTime<Utc>,
    pub LW_collected_live: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct P2P_Transfer {
    pub Tx_Hash: String,
    pub PT_token: String,
    pub PT_from: String,
    pub PT_to: String,
    pub PT_amount: BigDecimal,
    pub PT_price: BigDecimal,
    pub PT_block: i64,
    pub PT_timestamp: DateTime<Utc>,
    pub PT_collected_live: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EarningsType {
    LiquidityAdded,
    LiquidityRemoved,
}

impl EarningsType {
    pub const ALL: [EarningsType; 2] =
        [EarningsType::LiquidityAdded, EarningsType::LiquidityRemoved];
}

impl fmt::Display for EarningsType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EarningsType::LiquidityAdded => write!(f, "liquidity_added"),
            EarningsType::LiquidityRemoved => write!(f, "liquidity_removed"),
        }
    }
}

impl From<EarningsType> for String {
    fn from(value: EarningsType) -> Self {
        value.to_string()
    }
}

impl FromStr for EarningsType {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<EarningsType, Self::Err> {
        match value {
            "liquidity_added" => Ok(EarningsType::LiquidityAdded),
            "liquidity_removed" => Ok(EarningsType::LiquidityRemoved),
            _ => Err(io::Error::other("Earnings type not supported")),
        }
    }
}
