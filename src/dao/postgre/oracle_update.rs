use chrono::{DateTime, Utc};
use sqlx::error::Error;

use super::QueryResult;
use crate::model::{Oracle_Update, Table};

impl Table<Oracle_Update> {
    pub async fn get_provenance(
        &self,
        data: &Oracle_Update,
    ) -> Result<Option<bool>, crate::error::Error> {
        let value: Option<(bool,)> = sqlx::query_as(
            r#"
            SELECT "OU_collected_live" FROM "Oracle_Update"
            WHERE "Tx_Hash" = $1 AND "OU_perpetual_id" = $2
            "#,
        )
        .bind(&data.Tx_Hash)
        .bind(data.OU_perpetual_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.map(|(collected_live,)| collected_live))
    }

    pub async fn insert(
        &self,
        data: &Oracle_Update,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            INSERT INTO "Oracle_Update" (
                "Tx_Hash",
                "OU_perpetual_id",
                "OU_base_quote_s2",
                "OU_base_quote_s3",
                "OU_block",
                "OU_timestamp",
                "OU_collected_live"
            )
            VALUES($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT ("Tx_Hash", "OU_perpetual_id") DO NOTHING
        "#,
        )
        .bind(&data.Tx_Hash)
        .bind(data.OU_perpetual_id)
        .bind(&data.OU_base_quote_s2)
        .bind(&data.OU_base_quote_s3)
        .bind(data.OU_block)
        .bind(data.OU_timestamp)
        .bind(data.OU_collected_live)
        .execute(&self.pool)
        .await
    }

    pub async fn confirm(
        &self,
        data: &Oracle_Update,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            UPDATE "Oracle_Update"
            SET "OU_collected_live" = false
            WHERE
                "Tx_Hash" = $1 AND
                "OU_perpetual_id" = $2 AND
                "OU_collected_live" = true
            "#,
        )
        .bind(&data.Tx_Hash)
        .bind(data.OU_perpetual_id)
        .execute(&self.pool)
        .await
    }

    pub async fn get_cursor(
        &self,
    ) -> Result<Option<DateTime<Utc>>, crate::error::Error> {
        let (value,): (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT MAX("OU_timestamp") FROM "Oracle_Update" WHERE "OU_collected_live" = false
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }
}
