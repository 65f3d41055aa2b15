//! Common test utilities

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use deferred_authz::db;
use deferred_authz::receipt::{CommandError, CommandHandler, ReceiptStore, SqliteReceiptStore};
use deferred_authz::{CommandRegistry, ManualClock, ReceiptManager, ReceiptStoreConfig};
use parking_lot::Mutex;
use sqlx::sqlite::SqlitePoolOptions;

/// Records every invocation so tests can count dispatches
#[derive(Default)]
pub struct RecordingHandler {
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingHandler {
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait::async_trait]
impl CommandHandler for RecordingHandler {
    async fn execute(&self, arguments: &[String]) -> Result<String, CommandError> {
        // Widen the window between consume and dispatch
        tokio::task::yield_now().await;
        self.calls.lock().push(arguments.to_vec());
        Ok(format!("handled {}", arguments.join(" ")))
    }
}

pub struct TestSystem {
    pub manager: Arc<ReceiptManager>,
    pub store: Arc<dyn ReceiptStore>,
    pub handler: Arc<RecordingHandler>,
    pub clock: ManualClock,
}

/// In-memory SQLite store on a single connection
pub async fn setup_receipts() -> TestSystem {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory sqlite");

    let store = SqliteReceiptStore::new(pool, "").expect("valid prefix");
    store.install().await.expect("Failed to install receipt table");
    store.check_usable().await.expect("Receipt table unusable");

    system_over(Arc::new(store))
}

/// File-backed SQLite store opened the way the daemon opens it (WAL, pooled)
pub async fn setup_file_receipts(dir: &Path) -> TestSystem {
    let config = ReceiptStoreConfig {
        path: dir.join("receipts.db").to_string_lossy().into_owned(),
        ..Default::default()
    };
    let store = db::open_receipt_store(&config)
        .await
        .expect("Failed to open file-backed sqlite");
    db::verify_receipt_store(store.as_ref(), true)
        .await
        .expect("Receipt table unusable");

    system_over(store)
}

/// Manager over `store` with `verify-email` bound to a recording handler
pub fn system_over(store: Arc<dyn ReceiptStore>) -> TestSystem {
    let handler = Arc::new(RecordingHandler::default());
    let mut registry = CommandRegistry::new();
    registry.register("verify-email", handler.clone());

    let clock = ManualClock::default();
    let manager =
        ReceiptManager::new(store.clone(), registry).with_clock(Arc::new(clock.clone()));

    TestSystem {
        manager: Arc::new(manager),
        store,
        handler,
        clock,
    }
}

pub fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
