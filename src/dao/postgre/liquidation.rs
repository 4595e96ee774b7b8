use chrono::{DateTime, Utc};
use sqlx::error::Error;

use super::QueryResult;
use crate::model::{Liquidation, Table};

impl Table<Liquidation> {
    pub async fn get_provenance(
        &self,
        data: &Liquidation,
    ) -> Result<Option<bool>, crate::error::Error> {
        let value: Option<(bool,)> = sqlx::query_as(
            r#"
            SELECT
                "LQ_collected_live"
            FROM "Liquidation"
            WHERE "LQ_id" = $1
            "#,
        )
        .bind(&data.LQ_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.map(|(collected_live,)| collected_live))
    }

    pub async fn insert(
        &self,
        data: &Liquidation,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            INSERT INTO "Liquidation" (
                "LQ_id",
                "Tx_Hash",
                "LQ_trader",
                "LQ_liquidator",
                "LQ_perpetual_id",
                "LQ_position_id",
                "LQ_amount",
                "LQ_price",
                "LQ_new_position_size",
                "LQ_fee",
                "LQ_realized_pnl",
                "LQ_block",
                "LQ_timestamp",
                "LQ_collected_live"
            )
            VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT ("LQ_id") DO NOTHING
        "#,
        )
        .bind(&data.LQ_id)
        .bind(&data.Tx_Hash)
        .bind(&data.LQ_trader)
        .bind(&data.LQ_liquidator)
        .bind(data.LQ_perpetual_id)
        .bind(&data.LQ_position_id)
        .bind(&data.LQ_amount)
        .bind(&data.LQ_price)
        .bind(&data.LQ_new_position_size)
        .bind(&data.LQ_fee)
        .bind(&data.LQ_realized_pnl)
        .bind(data.LQ_block)
        .bind(data.LQ_timestamp)
        .bind(data.LQ_collected_live)
        .execute(&self.pool)
        .await
    }

    pub async fn confirm(
        &self,
        data: &Liquidation,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            UPDATE "Liquidation"
            SET "LQ_collected_live" = false
            WHERE "LQ_id" = $1 AND "LQ_collected_live" = true
            "#,
        )
        .bind(&data.LQ_id)
        .execute(&self.pool)
        .await
    }

    pub async fn get_cursor(
        &self,
    ) -> Result<Option<DateTime<Utc>>, crate::error::Error> {
        let (value,): (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT MAX("LQ_timestamp") FROM "Liquidation" WHERE "LQ_collected_live" = false
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }
}
