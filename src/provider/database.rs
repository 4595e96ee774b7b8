use std::fs;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use super::sink::EventSink;
use crate::{
    configuration::Config,
    dao::{get_path, PoolOption, PoolType, MIGRATIONS},
    error::Error,
    model::{
        Estimated_Earning, HistoryStream, Liquidation, Liquidity_Withdrawal,
        Margin_Update, Oracle_Update, P2P_Transfer, Provenance, Record, Table,
        Trade,
    },
};

#[derive(Debug)]
pub struct DatabasePool {
    pub trade: Table<Trade>,
    pub liquidation: Table<Liquidation>,
    pub margin_update: Table<Margin_Update>,
    pub estimated_earning: Table<Estimated_Earning>,
    pub liquidity_withdrawal: Table<Liquidity_Withdrawal>,
    pub oracle_update: Table<Oracle_Update>,
    pub p2p_transfer: Table<P2P_Transfer>,
    pub pool: PoolType,
}

impl DatabasePool {
    pub async fn new(config: &Config) -> Result<DatabasePool, Error> {
        let pool = PoolOption::new()
            .max_connections(config.max_connections)
            .connect(config.database_url.as_str())
            .await?;

        Ok(DatabasePool {
            trade: Table::new(pool.clone()),
            liquidation: Table::new(pool.clone()),
            margin_update: Table::new(pool.clone()),
            estimated_earning: Table::new(pool.clone()),
            liquidity_withdrawal: Table::new(pool.clone()),
            oracle_update: Table::new(pool.clone()),
            p2p_transfer: Table::new(pool.clone()),
            pool,
        })
    }

    /// Applies every schema file. Each one is `IF NOT EXISTS` guarded, so
    /// this runs on every start.
    pub async fn init_migrations(&self) -> Result<(), Error> {
        let dir = env!("CARGO_MANIFEST_DIR");

        for file in MIGRATIONS {
            let data = fs::read_to_string(get_path(dir, file))?;
            sqlx::raw_sql(&data).execute(&self.pool).await?;
        }

        info!(files = MIGRATIONS.len(), "Schema up to date");

        Ok(())
    }
}

#[async_trait]
impl EventSink for DatabasePool {
    async fn provenance(
        &self,
        record: &Record,
    ) -> Result<Option<Provenance>, Error> {
        let collected_live = match record {
            Record::Trade(item) => self.trade.get_provenance(item).await?,
            Record::Liquidation(item) => {
                self.liquidation.get_provenance(item).await?
            },
            Record::MarginUpdate(item) => {
                self.margin_update.get_provenance(item).await?
            },
            Record::EstimatedEarning(item) => {
                self.estimated_earning.get_provenance(item).await?
            },
            Record::LiquidityWithdrawal(item) => {
                self.liquidity_withdrawal.get_provenance(item).await?
            },
            Record::OracleUpdate(item) => {
                self.oracle_update.get_provenance(item).await?
            },
            Record::P2PTransfer(item) => {
                self.p2p_transfer.get_provenance(item).await?
            },
        };

        Ok(collected_live.map(Provenance::from_collected_live))
    }

    async fn insert(&self, record: &Record) -> Result<bool, Error> {
        let result = match record {
            Record::Trade(item) => self.trade.insert(item).await?,
            Record::Liquidation(item) => self.liquidation.insert(item).await?,
            Record::MarginUpdate(item) => {
                self.margin_update.insert(item).await?
            },
            Record::EstimatedEarning(item) => {
                self.estimated_earning.insert(item).await?
            },
            Record::LiquidityWithdrawal(item) => {
                self.liquidity_withdrawal.insert(item).await?
            },
            Record::OracleUpdate(item) => {
                self.oracle_update.insert(item).await?
            },
            Record::P2PTransfer(item) => self.p2p_transfer.insert(item).await?,
        };

        Ok(result.rows_affected() > 0)
    }

    async fn confirm(&self, record: &Record) -> Result<bool, Error> {
        let result = match record {
            Record::Trade(item) => self.trade.confirm(item).await?,
            Record::Liquidation(item) => self.liquidation.confirm(item).await?,
            Record::MarginUpdate(item) => {
                self.margin_update.confirm(item).await?
            },
            Record::EstimatedEarning(item) => {
                self.estimated_earning.confirm(item).await?
            },
            Record::LiquidityWithdrawal(item) => {
                self.liquidity_withdrawal.confirm(item).await?
            },
            Record::OracleUpdate(item) => {
                self.oracle_update.confirm(item).await?
            },
            Record::P2PTransfer(item) => {
                self.p2p_transfer.confirm(item).await?
            },
        };

        Ok(result.rows_affected() > 0)
    }

    async fn latest_cursor(
        &self,
        stream: &HistoryStream,
    ) -> Result<Option<DateTime<Utc>>, Error> {
        match stream {
            HistoryStream::Trade => self.trade.get_cursor().await,
            HistoryStream::Liquidate => self.liquidation.get_cursor().await,
            HistoryStream::MarginAccountUpdated => {
                self.margin_update.get_cursor().await
            },
            HistoryStream::WithdrawalInitiated => {
                self.liquidity_withdrawal.get_cursor(false).await
            },
            HistoryStream::WithdrawalRemoved => {
                self.liquidity_withdrawal.get_cursor(true).await
            },
            HistoryStream::EstimatedEarnings(earning_type) => {
                self.estimated_earning.get_cursor(*earning_type).await
            },
            HistoryStream::OraclesSet => self.oracle_update.get_cursor().await,
            HistoryStream::PeerTransfer(token) => {
                self.p2p_transfer.get_cursor(&format!("{:#x}", token)).await
            },
        }
    }
}
