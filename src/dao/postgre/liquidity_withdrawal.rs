use chrono::{DateTime, Utc};
use sqlx::error::Error;

use super::QueryResult;
use crate::model::{Liquidity_Withdrawal, Table};

impl Table<Liquidity_Withdrawal> {
    pub async fn get_provenance(
        &self,
        data: &Liquidity_Withdrawal,
    ) -> Result<Option<bool>, crate::error::Error> {
        let value: Option<(bool,)> = sqlx::query_as(
            r#"
            SELECT
                "LW_collected_live"
            FROM "Liquidity_Withdrawal"
            WHERE
                "Tx_Hash" = $1 AND
                "LW_user" = $2 AND
                "LW_is_removal" = $3
            "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.LW_user)
        .bind(data.LW_is_removal)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.map(|(collected_live,)| collected_live))
    }

    pub async fn insert(
        &self,
        data: &Liquidity_Withdrawal,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            INSERT INTO "Liquidity_Withdrawal" (
                "Tx_Hash",
                "LW_user",
                "LW_pool_id",
                "LW_share_amount",
                "LW_token_amount",
                "LW_is_removal",
                "LW_block",
                "LW_timestamp",
                "LW_collected_live"
            )
            VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT ("Tx_Hash", "LW_user", "LW_is_removal") DO NOTHING
        "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.LW_user)
        .bind(data.LW_pool_id)
        .bind(&data.LW_share_amount)
        .bind(&data.LW_token_amount)
        .bind(data.LW_is_removal)
        .bind(data.LW_block)
        .bind(data.LW_timestamp)
        .bind(data.LW_collected_live)
        .execute(&self.pool)
        .await
    }

    pub async fn confirm(
        &self,
        data: &Liquidity_Withdrawal,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            UPDATE "Liquidity_Withdrawal"
            SET "LW_collected_live" = false
            WHERE
                "Tx_Hash" = $1 AND
                "LW_user" = $2 AND
                "LW_is_removal" = $3 AND
                "LW_collected_live" = true
            "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.LW_user)
        .bind(data.LW_is_removal)
        .execute(&self.pool)
        .await
    }

    /// Initiations and removals resume independently.
    pub async fn get_cursor(
        &self,
        is_removal: bool,
    ) -> Result<Option<DateTime<Utc>>, crate::error::Error> {
        let (value,): (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT
                MAX("LW_timestamp")
            FROM "Liquidity_Withdrawal"
            WHERE
                "LW_is_removal" = $1 AND
                "LW_collected_live" = false
            "#,
        )
        .bind(is_removal)
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }
}
