use chrono::{DateTime, Utc};
use sqlx::error::Error;

use super::QueryResult;
use crate::model::{Table, Trade};

impl Table<Trade> {
    /// Stored `TD_collected_live` flag, `None` when absent.
    pub async fn get_provenance(
        &self,
        data: &Trade,
    ) -> Result<Option<bool>, crate::error::Error> {
        let value: Option<(bool,)> = sqlx::query_as(
            r#"
            SELECT
                "TD_collected_live"
            FROM "Trade"
            WHERE
                "Tx_Hash" = $1 AND
                "TD_trader" = $2
            "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.TD_trader)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.map(|(collected_live,)| collected_live))
    }

    pub async fn insert(&self, data: &Trade) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            INSERT INTO "Trade" (
                "Tx_Hash",
                "TD_trader",
                "TD_perpetual_id",
                "TD_position_id",
                "TD_order_digest",
                "TD_order_flags",
                "TD_broker",
                "TD_amount",
                "TD_new_position_size",
                "TD_price",
                "TD_fee",
                "TD_realized_pnl",
                "TD_b2c",
                "TD_block",
                "TD_timestamp",
                "TD_collected_live"
            )
            VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT ("Tx_Hash", "TD_trader") DO NOTHING
        "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.TD_trader)
        .bind(data.TD_perpetual_id)
        .bind(&data.TD_position_id)
        .bind(&data.TD_order_digest)
        .bind(data.TD_order_flags)
        .bind(&data.TD_broker)
        .bind(&data.TD_amount)
        .bind(&data.TD_new_position_size)
        .bind(&data.TD_price)
        .bind(&data.TD_fee)
        .bind(&data.TD_realized_pnl)
        .bind(&data.TD_b2c)
        .bind(data.TD_block)
        .bind(data.TD_timestamp)
        .bind(data.TD_collected_live)
        .execute(&self.pool)
        .await
    }

    pub async fn confirm(&self, data: &Trade) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            UPDATE "Trade"
            SET "TD_collected_live" = false
            WHERE
                "Tx_Hash" = $1 AND
                "TD_trader" = $2 AND
                "TD_collected_live" = true
            "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.TD_trader)
        .execute(&self.pool)
        .await
    }

    pub async fn get_cursor(
        &self,
    ) -> Result<Option<DateTime<Utc>>, crate::error::Error> {
        let (value,): (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT
                MAX("TD_timestamp")
            FROM "Trade"
            WHERE "TD_collected_live" = false
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }
}
