//! SQLite receipt store
//!
//! Single-file backend, the default for small installations. Timestamps are
//! stored as Unix milliseconds so that range comparisons stay numeric.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::store::{table_name, NewReceipt, Receipt, ReceiptStore};
use super::StoreError;

type ReceiptRow = (String, String, String, i64, i64, bool);

#[derive(Debug, Clone)]
pub struct SqliteReceiptStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteReceiptStore {
    pub fn new(pool: SqlitePool, table_prefix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            pool,
            table: table_name(table_prefix)?,
        })
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", ms)))
}

fn decode(row: ReceiptRow) -> Result<Receipt, StoreError> {
    let (id_digest, command, arguments, issued_at, expires_at, consumed) = row;
    Ok(Receipt {
        id_digest,
        command,
        arguments: serde_json::from_str(&arguments)?,
        issued_at: from_millis(issued_at)?,
        expires_at: from_millis(expires_at)?,
        consumed,
    })
}

#[async_trait]
impl ReceiptStore for SqliteReceiptStore {
    async fn install(&self) -> Result<(), StoreError> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id_digest  TEXT PRIMARY KEY NOT NULL,
                command    TEXT NOT NULL,
                arguments  TEXT NOT NULL,
                issued_at  INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                consumed   INTEGER NOT NULL DEFAULT 0
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

        tracing::info!(table = %self.table, "Receipt table installed (sqlite)");
        Ok(())
    }

    async fn check_usable(&self) -> Result<(), StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        )
        .bind(&self.table)
        .fetch_one(&self.pool)
        .await?;

        if !exists {
            return Err(StoreError::NotInstalled(format!(
                "table '{}' does not exist",
                self.table
            )));
        }

        // Select every column the store relies on
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
            VALUES (?1, ?2, ?3, ?4, ?5, 0)
            "#,
            self.table
        );

        let result = sqlx::query(&sql)
            .bind(&receipt.id_digest)
            .bind(&receipt.command)
            .bind(serde_json::to_string(&receipt.arguments)?)
            .bind(receipt.issued_at.timestamp_millis())
            .bind(receipt.expires_at.timestamp_millis())
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
            WHERE id_digest = ?1
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
            SET consumed = 1
            WHERE id_digest = ?1 AND consumed = 0 AND expires_at >= ?2
            "#,
            self.table
        );

        let rows = sqlx::query(&sql)
            .bind(id_digest)
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows == 1)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let sql = format!("DELETE FROM {} WHERE expires_at < ?1", self.table);

        let rows = sqlx::query(&sql)
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteReceiptStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteReceiptStore::new(pool, "test_").unwrap();
        store.install().await.unwrap();
        store
    }

    fn new_receipt(digest: &str, expires_at: DateTime<Utc>) -> NewReceipt {
        NewReceipt {
            id_digest: digest.to_string(),
            command: "verify-email".to_string(),
            arguments: vec!["alice".to_string(), "alice@example.com".to_string()],
            issued_at: expires_at - Duration::minutes(60),
            expires_at,
        }
    }

    fn millis(ts: DateTime<Utc>) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap()
    }

    #[tokio::test]
    async fn test_check_usable_requires_install() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteReceiptStore::new(pool, "").unwrap();

        assert!(matches!(
            store.check_usable().await,
            Err(StoreError::NotInstalled(_))
        ));
        store.install().await.unwrap();
        store.install().await.unwrap();
        store.check_usable().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = store().await;
        let expires_at = millis(Utc::now() + Duration::minutes(60));
        store.create(&new_receipt("abc", expires_at)).await.unwrap();

        let receipt = store.get("abc").await.unwrap().unwrap();
        assert_eq!(receipt.command, "verify-email");
        assert_eq!(receipt.arguments, vec!["alice", "alice@example.com"]);
        assert_eq!(receipt.expires_at, expires_at);
        assert!(!receipt.consumed);

        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_digest_is_reported() {
        let store = store().await;
        let expires_at = Utc::now() + Duration::minutes(5);
        store.create(&new_receipt("dup", expires_at)).await.unwrap();

        let err = store.create(&new_receipt("dup", expires_at)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId));
    }

    #[tokio::test]
    async fn test_consume_is_conditional() {
        let store = store().await;
        let now = Utc::now();
        store
            .create(&new_receipt("live", now + Duration::minutes(5)))
            .await
            .unwrap();
        store
            .create(&new_receipt("stale", now - Duration::minutes(5)))
            .await
            .unwrap();

        assert!(store.consume("live", now).await.unwrap());
        assert!(!store.consume("live", now).await.unwrap());
        assert!(!store.consume("stale", now).await.unwrap());
        assert!(!store.consume("missing", now).await.unwrap());

        assert!(store.get("live").await.unwrap().unwrap().consumed);
        assert!(!store.get("stale").await.unwrap().unwrap().consumed);
    }

    #[tokio::test]
    async fn test_delete_expired_ignores_consumed_state() {
        let store = store().await;
        let now = millis(Utc::now());
        store
            .create(&new_receipt("old-unused", now - Duration::minutes(1)))
            .await
            .unwrap();
        store
            .create(&new_receipt("old-used", now - Duration::minutes(2)))
            .await
            .unwrap();
        store.create(&new_receipt("boundary", now)).await.unwrap();
        store
            .create(&new_receipt("fresh", now + Duration::minutes(1)))
            .await
            .unwrap();

        // Consumed while still live, then left to expire
        assert!(store.consume("old-used", now - Duration::minutes(3)).await.unwrap());

        assert_eq!(store.delete_expired(now).await.unwrap(), 2);
        assert!(store.get("old-unused").await.unwrap().is_none());
        assert!(store.get("old-used").await.unwrap().is_none());
        assert!(store.get("boundary").await.unwrap().is_some());
        assert!(store.get("fresh").await.unwrap().is_some());
    }
}
