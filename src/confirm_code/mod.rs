//! Confirm Code Manager
//!
//! Ephemeral, purpose-bound, single-use codes kept in process memory.

mod manager;
mod store;

pub use manager::{
    ConfirmCodeError, ConfirmCodeManager, CODE_ALPHABET, MAX_CODE_LENGTH, MIN_CODE_LENGTH,
};
pub use store::{CodeEntry, CodeKey, ConfirmCodeStore};
