//! Receipt Store
//!
//! Persistence abstraction for receipts. Backends live in the sibling
//! `postgres` and `sqlite` modules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::StoreError;

/// A receipt row about to be written
#[derive(Debug, Clone)]
pub struct NewReceipt {
    /// SHA-256 hex digest of the id handed to the user
    pub id_digest: String,
    pub command: String,
    pub arguments: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A stored receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub id_digest: String,
    pub command: String,
    pub arguments: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl Receipt {
    /// Expired once `now` is strictly past `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Durable backing store for receipts.
///
/// `consume` is the only operation that must be atomic: a single
/// conditional update whose affected-row count tells the caller whether it
/// won the race.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Create the receipt table and indexes if they do not exist
    async fn install(&self) -> Result<(), StoreError>;

    /// Startup usability check. Fails with `NotInstalled` if the table is absent.
    async fn check_usable(&self) -> Result<(), StoreError>;

    /// Insert a new unconsumed row. Fails with `DuplicateId` on a digest collision.
    async fn create(&self, receipt: &NewReceipt) -> Result<(), StoreError>;

    async fn get(&self, id_digest: &str) -> Result<Option<Receipt>, StoreError>;

    /// Flip `consumed` to true if the row exists, is unconsumed and has not
    /// expired at `now`. Returns whether this call performed the flip.
    async fn consume(&self, id_digest: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Delete every row with `expires_at < now`, consumed or not
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Release the underlying connection pool
    async fn close(&self);
}

/// Validate a table prefix and build the receipt table name
pub fn table_name(prefix: &str) -> Result<String, StoreError> {
    if !prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(StoreError::NotInstalled(format!(
            "invalid table prefix '{}'",
            prefix
        )));
    }
    Ok(format!("{}receipts", prefix))
}
