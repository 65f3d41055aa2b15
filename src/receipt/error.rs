//! Receipt Errors
//!
//! Error types for receipt issuance, redemption and storage.

/// Errors raised by a [`ReceiptStore`](super::ReceiptStore) backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A row with the same id digest already exists
    #[error("Receipt id collision")]
    DuplicateId,

    /// Receipt table is missing or malformed
    #[error("Receipt store is not installed: {0}")]
    NotInstalled(String),

    /// Stored row could not be decoded
    #[error("Corrupt receipt row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while dispatching a registered command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    NotFound(String),

    #[error("Invalid arguments for {command}: {reason}")]
    InvalidArguments { command: String, reason: String },

    /// The handler ran and reported failure
    #[error("Command {command} failed: {reason}")]
    Failed { command: String, reason: String },
}

impl CommandError {
    pub fn invalid_arguments(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            command: command.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the [`ReceiptManager`](super::ReceiptManager)
#[derive(Debug, thiserror::Error)]
pub enum ReceiptError {
    #[error("Receipt not found")]
    NotFound,

    #[error("Receipt has expired")]
    Expired,

    #[error("Receipt has already been used")]
    AlreadyConsumed,

    /// Tag not in the registry: tampered or corrupted receipt
    #[error("Command not registered: {0}")]
    CommandNotFound(String),

    #[error("Invalid command arguments: {0}")]
    InvalidArguments(String),

    /// Receipt was consumed but the handler failed
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Receipt lifetime must be positive, got {0} minutes")]
    InvalidLifetime(i64),

    #[error("Receipt store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("Receipt id generation failed: {0}")]
    GenerationFailure(String),

    #[error("Receipt system has been disposed")]
    Disposed,
}

impl ReceiptError {
    /// Expected outcomes a caller shows to the user as a polite message
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ReceiptError::NotFound | ReceiptError::Expired | ReceiptError::AlreadyConsumed
        )
    }

    /// Infrastructure faults or internal inconsistency, reported to the operator
    pub fn is_internal(&self) -> bool {
        !self.is_user_facing() && !matches!(self, ReceiptError::InvalidLifetime(_))
    }

    /// Message safe to show to whoever followed the link
    pub fn user_message(&self) -> &'static str {
        match self {
            ReceiptError::NotFound => "This link is not valid.",
            ReceiptError::Expired => "This link has expired. Please request a new one.",
            ReceiptError::AlreadyConsumed => "This link has already been used.",
            ReceiptError::InvalidLifetime(_) => "The request was invalid.",
            _ => "Something went wrong on our side. Please try again later.",
        }
    }
}

impl From<CommandError> for ReceiptError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::NotFound(tag) => ReceiptError::CommandNotFound(tag),
            e @ CommandError::InvalidArguments { .. } => {
                ReceiptError::InvalidArguments(e.to_string())
            }
            e @ CommandError::Failed { .. } => ReceiptError::CommandFailed(e.to_string()),
        }
    }
}

impl From<StoreError> for ReceiptError {
    fn from(err: StoreError) -> Self {
        ReceiptError::StoreUnavailable(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ReceiptError::NotFound.is_user_facing());
        assert!(ReceiptError::Expired.is_user_facing());
        assert!(ReceiptError::AlreadyConsumed.is_user_facing());

        assert!(ReceiptError::CommandNotFound("x".into()).is_internal());
        assert!(ReceiptError::StoreUnavailable(StoreError::DuplicateId).is_internal());
        assert!(ReceiptError::GenerationFailure("x".into()).is_internal());
        assert!(ReceiptError::Disposed.is_internal());

        let err = ReceiptError::InvalidLifetime(0);
        assert!(!err.is_user_facing());
        assert!(!err.is_internal());
    }

    #[test]
    fn test_user_message_hides_details() {
        let err = ReceiptError::CommandNotFound("drop-tables".into());
        assert!(!err.user_message().contains("drop-tables"));
        assert!(ReceiptError::Expired.user_message().contains("expired"));
    }

    #[test]
    fn test_command_error_conversion() {
        let err: ReceiptError = CommandError::NotFound("nope".into()).into();
        assert!(matches!(err, ReceiptError::CommandNotFound(ref t) if t == "nope"));

        let err: ReceiptError = CommandError::failed("verify-email", "db down").into();
        assert!(matches!(err, ReceiptError::CommandFailed(_)));
        assert!(err.to_string().contains("db down"));
    }
}
