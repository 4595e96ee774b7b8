use chrono::{DateTime, Utc};
use sqlx::error::Error;

use super::QueryResult;
use crate::model::{P2P_Transfer, Table};

impl Table<P2P_Transfer> {
    pub async fn get_provenance(
        &self,
        data: &P2P_Transfer,
    ) -> Result<Option<bool>, crate::error::Error> {
        let value: Option<(bool,)> = sqlx::query_as(
            r#"
            SELECT
                "PT_collected_live"
            FROM "P2P_Transfer"
            WHERE
                "Tx_Hash" = $1 AND
                "PT_token" = $2 AND
                "PT_from" = $3
            "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.PT_token)
        .bind(&data.PT_from)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.map(|(collected_live,)| collected_live))
    }

    pub async fn insert(
        &self,
        data: &P2P_Transfer,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            INSERT INTO "P2P_Transfer" (
                "Tx_Hash",
                "PT_token",
                "PT_from",
                "PT_to",
                "PT_amount",
                "PT_price",
                "PT_block",
                "PT_timestamp",
                "PT_collected_live"
            )
            VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT ("Tx_Hash", "PT_token", "PT_from") DO NOTHING
        "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.PT_token)
        .bind(&data.PT_from)
        .bind(&data.PT_to)
        .bind(&data.PT_amount)
        .bind(&data.PT_price)
        .bind(data.PT_block)
        .bind(data.PT_timestamp)
        .bind(data.PT_collected_live)
        .execute(&self.pool)
        .await
    }

    pub async fn confirm(
        &self,
        data: &P2P_Transfer,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            UPDATE "P2P_Transfer"
            SET "PT_collected_live" = false
            WHERE
                "Tx_Hash" = $1 AND
                "PT_token" = $2 AND
                "PT_from" = $3 AND
                "PT_collected_live" = true
            "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.PT_token)
        .bind(&data.PT_from)
        .execute(&self.pool)
        .await
    }

    /// One cursor per share token contract.
    pub async fn get_cursor(
        &self,
        token: &str,
    ) -> Result<Option<DateTime<Utc>>, crate::error::Error> {
        let (value,): (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT
                MAX("PT_timestamp")
            FROM "P2P_Transfer"
            WHERE
                "PT_token" = $1 AND
                "PT_collected_live" = false
            "#,
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }
}
