use chrono::{DateTime, Utc};
use sqlx::error::Error;

use super::QueryResult;
use crate::model::{EarningsType, Estimated_Earning, Table};

impl Table<Estimated_Earning> {
    pub async fn get_provenance(
        &self,
        data: &Estimated_Earning,
    ) -> Result<Option<bool>, crate::error::Error> {
        let value: Option<(bool,)> = sqlx::query_as(
            r#"
            SELECT
                "EE_collected_live"
            FROM "Estimated_Earning"
            WHERE
                "Tx_Hash" = $1 AND
                "EE_user" = $2 AND
                "EE_type" = $3
            "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.EE_user)
        .bind(&data.EE_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.map(|(collected_live,)| collected_live))
    }

    pub async fn insert(
        &self,
        data: &Estimated_Earning,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            INSERT INTO "Estimated_Earning" (
                "Tx_Hash",
                "EE_user",
                "EE_pool_id",
                "EE_type",
                "EE_token_amount",
                "EE_share_amount",
                "EE_block",
                "EE_timestamp",
                "EE_collected_live"
            )
            VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT ("Tx_Hash", "EE_user", "EE_type") DO NOTHING
        "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.EE_user)
        .bind(data.EE_pool_id)
        .bind(&data.EE_type)
        .bind(&data.EE_token_amount)
        .bind(&data.EE_share_amount)
        .bind(data.EE_block)
        .bind(data.EE_timestamp)
        .bind(data.EE_collected_live)
        .execute(&self.pool)
        .await
    }

    pub async fn confirm(
        &self,
        data: &Estimated_Earning,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            UPDATE "Estimated_Earning"
            SET "EE_collected_live" = false
            WHERE
                "Tx_Hash" = $1 AND
                "EE_user" = $2 AND
                "EE_type" = $3 AND
                "EE_collected_live" = true
            "#,
        )
        .bind(&data.Tx_Hash)
        .bind(&data.EE_user)
        .bind(&data.EE_type)
        .execute(&self.pool)
        .await
    }

    pub async fn get_cursor(
        &self,
        earning_type: EarningsType,
    ) -> Result<Option<DateTime<Utc>>, crate::error::Error> {
        let (value,): (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT
                MAX("EE_timestamp")
            FROM "Estimated_Earning"
            WHERE
                "EE_type" = $1 AND
                "EE_collected_live" = false
            "#,
        )
        .bind(String::from(earning_type))
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }
}
