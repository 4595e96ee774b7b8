use std::path::PathBuf;

/// Schema files, applied in this order on every start.
pub const MIGRATIONS: [&str; 7] = [
    "trade.sql",
    "liquidation.sql",
    "margin_update.sql",
    "estimated_earning.sql",
    "liquidity_withdrawal.sql",
    "oracle_update.sql",
    "p2p_transfer.sql",
];

pub fn get_path(dir: &str, file: &str) -> PathBuf {
    [dir, "migration", "postgresql", file].iter().collect()
}
