//! Database module
//!
//! Opens the configured receipt backend and verifies it is usable.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::config::{ReceiptStoreConfig, ReceiptStoreKind};
use crate::receipt::{PgReceiptStore, ReceiptStore, SqliteReceiptStore, StoreError};

/// Connect to the configured backend. Does not touch the schema.
pub async fn open_receipt_store(
    config: &ReceiptStoreConfig,
) -> Result<Arc<dyn ReceiptStore>, StoreError> {
    match config.kind {
        ReceiptStoreKind::Sqlite => {
            let in_memory = config.path == ":memory:";
            let options = if in_memory {
                SqliteConnectOptions::from_str("sqlite::memory:")?
            } else {
                SqliteConnectOptions::new()
                    .filename(&config.path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
            };

            // Every connection to :memory: would see its own empty database
            let max_connections = if in_memory { 1 } else { config.max_connections };

            let pool = SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_with(options)
                .await?;

            tracing::info!(path = %config.path, "Connected to sqlite receipt store");
            Ok(Arc::new(SqliteReceiptStore::new(pool, &config.table_prefix)?))
        }
        ReceiptStoreKind::Postgres => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| StoreError::NotInstalled("no postgres URL configured".into()))?;

            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(url)
                .await?;

            tracing::info!("Connected to postgres receipt store");
            Ok(Arc::new(PgReceiptStore::new(pool, &config.table_prefix)?))
        }
    }
}

/// Install the schema when allowed, then run the usability check
pub async fn verify_receipt_store(
    store: &dyn ReceiptStore,
    auto_install: bool,
) -> Result<(), StoreError> {
    if auto_install {
        store.install().await?;
    }

    if let Err(e) = store.check_usable().await {
        tracing::error!(error = %e, "Receipt store is not usable. Please install it first.");
        return Err(e);
    }

    tracing::info!("Receipt store verified");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config(auto_install: bool) -> ReceiptStoreConfig {
        ReceiptStoreConfig {
            path: ":memory:".to_string(),
            auto_install,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_memory_store_installs_and_verifies() {
        let config = memory_config(true);
        let store = open_receipt_store(&config).await.unwrap();
        verify_receipt_store(store.as_ref(), config.auto_install)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_verification_fails_without_install() {
        let config = memory_config(false);
        let store = open_receipt_store(&config).await.unwrap();
        let err = verify_receipt_store(store.as_ref(), config.auto_install)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotInstalled(_)));
    }
}
