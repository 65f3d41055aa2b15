//! Receipt Manager
//!
//! Issues receipts, redeems them exactly once and purges expired rows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::command::{CommandRegistry, ReceiptCommand};
use super::store::{NewReceipt, ReceiptStore};
use super::{ReceiptError, StoreError};
use crate::clock::{Clock, SystemClock};
use crate::token::{digest_id, RandomTokenGenerator, TokenGenerator};

/// Attempts at generating a non-colliding id before giving up
pub const MAX_ID_ATTEMPTS: usize = 3;

/// Log-safe prefix of an id digest
fn short(digest: &str) -> &str {
    digest.get(..8).unwrap_or(digest)
}

/// Result of a successful redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub command: String,
    /// Whatever the handler reported
    pub outcome: String,
}

pub struct ReceiptManager {
    store: Arc<dyn ReceiptStore>,
    registry: CommandRegistry,
    tokens: Arc<dyn TokenGenerator>,
    clock: Arc<dyn Clock>,
    disposed: AtomicBool,
}

impl ReceiptManager {
    pub fn new(store: Arc<dyn ReceiptStore>, registry: CommandRegistry) -> Self {
        Self {
            store,
            registry,
            tokens: Arc::new(RandomTokenGenerator::new()),
            clock: Arc::new(SystemClock),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_token_generator(mut self, tokens: Arc<dyn TokenGenerator>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Current time at the millisecond precision both backends store
    fn now(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
    }

    fn ensure_live(&self) -> Result<(), ReceiptError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ReceiptError::Disposed);
        }
        Ok(())
    }

    // =========================================================================
    // Issue
    // =========================================================================

    /// Issue a receipt bound to `command` and its arguments.
    ///
    /// Returns the plain id to embed in a link. Only its digest is stored.
    pub async fn issue_receipt(
        &self,
        lifetime_minutes: i64,
        command: &str,
        arguments: Vec<String>,
    ) -> Result<String, ReceiptError> {
        self.ensure_live()?;

        if lifetime_minutes <= 0 {
            return Err(ReceiptError::InvalidLifetime(lifetime_minutes));
        }
        let lifetime = Duration::try_minutes(lifetime_minutes)
            .ok_or(ReceiptError::InvalidLifetime(lifetime_minutes))?;

        if !self.registry.contains(command) {
            tracing::warn!(command = %command, "Issuing receipt for unregistered command");
        }

        let issued_at = self.now();
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .ok_or(ReceiptError::InvalidLifetime(lifetime_minutes))?;

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = self
                .tokens
                .new_id()
                .map_err(|e| ReceiptError::GenerationFailure(e.to_string()))?;

            let row = NewReceipt {
                id_digest: digest_id(&id),
                command: command.to_string(),
                arguments: arguments.clone(),
                issued_at,
                expires_at,
            };

            match self.store.create(&row).await {
                Ok(()) => {
                    tracing::info!(
                        command = %command,
                        expires_at = %expires_at,
                        "Receipt issued"
                    );
                    return Ok(id);
                }
                Err(StoreError::DuplicateId) => {
                    tracing::warn!(attempt, "Receipt id collision, regenerating");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to store receipt");
                    return Err(e.into());
                }
            }
        }

        Err(ReceiptError::GenerationFailure(format!(
            "id collided {} times in a row",
            MAX_ID_ATTEMPTS
        )))
    }

    /// Issue a receipt for one of the typed built-in commands
    pub async fn issue_command(
        &self,
        lifetime_minutes: i64,
        command: ReceiptCommand,
    ) -> Result<String, ReceiptError> {
        let tag = command.tag();
        self.issue_receipt(lifetime_minutes, tag, command.into_arguments())
            .await
    }

    // =========================================================================
    // Redeem
    // =========================================================================

    /// Validate, consume and dispatch the receipt behind `id`.
    ///
    /// The row is consumed with a single conditional update before the
    /// handler runs, so concurrent redemptions dispatch at most once. A
    /// receipt naming an unregistered command is rejected unconsumed.
    pub async fn redeem(&self, id: &str) -> Result<Redemption, ReceiptError> {
        self.ensure_live()?;

        let digest = digest_id(id);
        let now = self.now();

        let receipt = self
            .store
            .get(&digest)
            .await?
            .ok_or(ReceiptError::NotFound)?;

        if receipt.is_expired_at(now) {
            tracing::debug!(receipt = short(&digest), "Rejected expired receipt");
            return Err(ReceiptError::Expired);
        }
        if receipt.consumed {
            tracing::debug!(receipt = short(&digest), "Rejected consumed receipt");
            return Err(ReceiptError::AlreadyConsumed);
        }

        // Unknown tags leave the row untouched so a fixed registry can still redeem it
        if !self.registry.contains(&receipt.command) {
            tracing::error!(command = %receipt.command, "Receipt names an unregistered command");
            return Err(ReceiptError::CommandNotFound(receipt.command));
        }

        if !self.store.consume(&digest, now).await? {
            // Lost the race to a concurrent redemption
            tracing::debug!(receipt = short(&digest), "Receipt consumed concurrently");
            return Err(ReceiptError::AlreadyConsumed);
        }

        let outcome = match self
            .registry
            .dispatch(&receipt.command, &receipt.arguments)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    command = %receipt.command,
                    error = %e,
                    "Receipt consumed but command failed"
                );
                return Err(e.into());
            }
        };

        tracing::info!(command = %receipt.command, "Receipt redeemed");
        Ok(Redemption {
            command: receipt.command,
            outcome,
        })
    }

    // =========================================================================
    // Purge / Dispose
    // =========================================================================

    /// Delete every receipt that expired before now, consumed or not
    pub async fn purge(&self) -> Result<u64, ReceiptError> {
        self.ensure_live()?;

        let rows_deleted = self.store.delete_expired(self.now()).await?;
        if rows_deleted > 0 {
            tracing::info!(rows_deleted, "Purged expired receipts");
        }
        Ok(rows_deleted)
    }

    /// Release the store. Every later call, including a second dispose, fails.
    pub async fn dispose(&self) -> Result<(), ReceiptError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Err(ReceiptError::Disposed);
        }
        self.store.close().await;
        tracing::info!("Receipt system disposed");
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ReceiptManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiptManager")
            .field("registry", &self.registry)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
