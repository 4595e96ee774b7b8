pub use self::{
    path::{get_path, MIGRATIONS},
    types::{PoolOption, PoolType, QueryResult},
};

mod estimated_earning;
mod liquidation;
mod liquidity_withdrawal;
mod margin_update;
mod oracle_update;
mod p2p_transfer;
mod path;
mod trade;
mod types;
