//! Deferred Action Authorization
//!
//! Lets the forge defer a sensitive action until someone proves they hold a
//! secret sent through another channel:
//!
//! - [`receipt`]: durable single-use tokens that run a registered command
//!   when redeemed (email verification, password reset, ...).
//! - [`confirm_code`]: short-lived in-memory codes checked and burned on
//!   first correct use (email 2FA).

pub mod clock;
pub mod config;
pub mod confirm_code;
pub mod db;
pub mod init;
pub mod jobs;
pub mod receipt;
pub mod token;

mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    Config, ConfigError, ConfirmCodeConfig, ConfirmCodeKind, ReceiptStoreConfig, ReceiptStoreKind,
};
pub use confirm_code::{ConfirmCodeError, ConfirmCodeManager};
pub use error::{AuthzError, AuthzResult, ErrorResponse};
pub use init::{initialize_confirm_code_manager, initialize_receipt_system, InitError};
pub use receipt::{CommandRegistry, ReceiptCommand, ReceiptError, ReceiptManager, Redemption};
