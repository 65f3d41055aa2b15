//! Receipt System
//!
//! Durable, single-use, time-boxed tokens bound to a registered command.

mod builtin;
mod command;
mod error;
mod manager;
mod postgres;
mod sqlite;
mod store;

pub use builtin::{register_builtin_commands, AccountDirectory};
pub use command::{
    CommandHandler, CommandRegistry, FnHandler, ReceiptCommand, ACTIVATE_SSH_KEY,
    CONFIRM_REGISTRATION, RESET_PASSWORD, VERIFY_EMAIL,
};
pub use error::{CommandError, ReceiptError, StoreError};
pub use manager::{ReceiptManager, Redemption, MAX_ID_ATTEMPTS};
pub use postgres::PgReceiptStore;
pub use sqlite::SqliteReceiptStore;
pub use store::{NewReceipt, Receipt, ReceiptStore};
