use chrono::{DateTime, Utc};
use sqlx::error::Error;

use super::QueryResult;
use crate::model::{Margin_Update, Table};

impl Table<Margin_Update> {
    pub async fn get_provenance(
        &self,
        data: &Margin_Update,
    ) -> Result<Option<bool>, crate::error::Error> {
        let value: Option<(bool,)> = sqlx::query_as(
            r#"
            SELECT
                "MU_collected_live"
            FROM "Margin_Update"
            WHERE
                "Tx_Hash" = $1 AND
                "MU_trader" = $2 AND
                "MU_perpetual_id" = $3
            "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.MU_trader)
        .bind(data.MU_perpetual_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.map(|(collected_live,)| collected_live))
    }

    pub async fn insert(
        &self,
        data: &Margin_Update,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            INSERT INTO "Margin_Update" (
                "Tx_Hash",
                "MU_trader",
                "MU_perpetual_id",
                "MU_position_id",
                "MU_position",
                "MU_cash",
                "MU_locked_in_value",
                "MU_funding_payment",
                "MU_open_interest",
                "MU_block",
                "MU_timestamp",
                "MU_collected_live"
            )
            VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT ("Tx_Hash", "MU_trader", "MU_perpetual_id") DO NOTHING
        "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.MU_trader)
        .bind(data.MU_perpetual_id)
        .bind(&data.MU_position_id)
        .bind(&data.MU_position)
        .bind(&data.MU_cash)
        .bind(&data.MU_locked_in_value)
        .bind(&data.MU_funding_payment)
        .bind(&data.MU_open_interest)
        .bind(data.MU_block)
        .bind(data.MU_timestamp)
        .bind(data.MU_collected_live)
        .execute(&self.pool)
        .await
    }

    pub async fn confirm(
        &self,
        data: &Margin_Update,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            UPDATE "Margin_Update"
            SET "MU_collected_live" = false
            WHERE
                "Tx_Hash" = $1 AND
                "MU_trader" = $2 AND
                "MU_perpetual_id" = $3 AND
                "MU_collected_live" = true
            "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.MU_trader)
        .bind(data.MU_perpetual_id)
        .execute(&self.pool)
        .await
    }

    pub async fn get_cursor(
        &self,
    ) -> Result<Option<DateTime<Utc>>, crate::error::Error> {
        let (value,): (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT
                MAX("MU_timestamp")
            FROM "Margin_Update"
            WHERE "MU_collected_live" = false
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }
}
