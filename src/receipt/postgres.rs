//! PostgreSQL receipt store
//!
//! Hosted backend for installations that already run Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::store::{table_name, NewReceipt, Receipt, ReceiptStore};
use super::StoreError;

type ReceiptRow = (
    String,
    String,
    serde_json::Value,
    DateTime<Utc>,
    DateTime<Utc>,
    bool,
);

#[derive(Debug, Clone)]
pub struct PgReceiptStore {
    pool: PgPool,
    table: String,
}

impl PgReceiptStore {
    pub fn new(pool: PgPool, table_prefix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            pool,
            table: table_name(table_prefix)?,
        })
    }
}

fn decode(row: ReceiptRow) -> Result<Receipt, StoreError> {
    let (id_digest, command, arguments, issued_at, expires_at, consumed) = row;
    Ok(Receipt {
        id_digest,
        command,
        arguments: serde_json::from_value(arguments)?,
        issued_at,
        expires_at,
        consumed,
    })
}

#[async_trait]
impl ReceiptStore for PgReceiptStore {
    async fn install(&self) -> Result<(), StoreError> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id_digest  TEXT PRIMARY KEY,
                command    TEXT NOT NULL,
                arguments  JSONB NOT NULL,
                issued_at  TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL,
                consumed   BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
            table = self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS {table}_expires_at_idx ON {table} (expires_at)",
            table = self.table
        );
        sqlx::query(&index).execute(&self.pool).await?;

        tracing::info!(table = %self.table, "Receipt table installed (postgres)");
        Ok(())
    }

    async fn check_usable(&self) -> Result<(), StoreError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
        )
        .bind(&self.table)
        .fetch_one(&self.pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", self.table);
            return Err(StoreError::NotInstalled(format!(
                "table '{}' does not exist",
                self.table
            )));
        }

        let check = format!(
            "SELECT id_digest, command, arguments, issued_at, expires_at, consumed FROM {} LIMIT 1",
            self.table
        );
        sqlx::query(&check)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::NotInstalled(e.to_string()))?;

        Ok(())
    }

    async fn create(&self, receipt: &NewReceipt) -> Result<(), StoreError> {
        let sql = format!(
            r#"
            INSERT INTO {} (id_digest, command, arguments, issued_at, expires_at, consumed)
            VALUES ($1, $2, $3, $4, $5, FALSE)
            "#,
            self.table
        );

        let result = sqlx::query(&sql)
            .bind(&receipt.id_digest)
            .bind(&receipt.command)
            .bind(serde_json::to_value(&receipt.arguments)?)
            .bind(receipt.issued_at)
            .bind(receipt.expires_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateId)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id_digest: &str) -> Result<Option<Receipt>, StoreError> {
        let sql = format!(
            r#"
            SELECT id_digest, command, arguments, issued_at, expires_at, consumed
            FROM {}
            WHERE id_digest = $1
            "#,
            self.table
        );

        let row: Option<ReceiptRow> = sqlx::query_as(&sql)
            .bind(id_digest)
            .fetch_optional(&self.pool)
            .await?;

        row.map(decode).transpose()
    }

    async fn consume(&self, id_digest: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let sql = format!(
            r#"
            UPDATE {}
            SET consumed = TRUE
            WHERE id_digest = $1 AND consumed = FALSE AND expires_at >= $2
            "#,
            self.table
        );

        let rows = sqlx::query(&sql)
            .bind(id_digest)
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows == 1)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let sql = format!("DELETE FROM {} WHERE expires_at < $1", self.table);

        let rows = sqlx::query(&sql)
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
