//! Subsystem initialization
//!
//! Builds both managers from configuration. A failure returns only the
//! error; no half-initialized manager ever reaches the caller.

use crate::config::{ConfirmCodeConfig, ReceiptStoreConfig};
use crate::confirm_code::{ConfirmCodeError, ConfirmCodeManager};
use crate::db;
use crate::receipt::{CommandRegistry, ReceiptManager, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Receipt store unavailable: {0}")]
    ReceiptStore(#[from] StoreError),

    #[error(transparent)]
    ConfirmCode(#[from] ConfirmCodeError),
}

/// Connect, install if configured, verify, then wrap in a manager
pub async fn initialize_receipt_system(
    config: &ReceiptStoreConfig,
    registry: CommandRegistry,
) -> Result<ReceiptManager, InitError> {
    let store = db::open_receipt_store(config).await?;

    if let Err(e) = db::verify_receipt_store(store.as_ref(), config.auto_install).await {
        store.close().await;
        return Err(e.into());
    }

    tracing::info!(commands = ?registry.tags(), "Receipt system initialized");
    Ok(ReceiptManager::new(store, registry))
}

pub fn initialize_confirm_code_manager(
    config: &ConfirmCodeConfig,
) -> Result<ConfirmCodeManager, InitError> {
    let manager = ConfirmCodeManager::from_config(config)?;
    tracing::info!(
        timeout_minutes = config.default_timeout_minutes,
        "Confirm code manager initialized"
    );
    Ok(manager)
}
