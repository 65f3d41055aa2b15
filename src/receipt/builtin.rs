//! Built-in receipt commands
//!
//! Handlers for the account actions the forge defers behind a receipt.
//! The account data itself lives behind [`AccountDirectory`], which the host
//! application implements on top of its user database.

use std::sync::Arc;

use async_trait::async_trait;

use super::command::{
    CommandHandler, CommandRegistry, ReceiptCommand, ACTIVATE_SSH_KEY, CONFIRM_REGISTRATION,
    RESET_PASSWORD, VERIFY_EMAIL,
};
use super::CommandError;

/// Account operations the built-in commands perform.
///
/// Implementations should be idempotent: marking an already verified email
/// as verified again must succeed without corrupting state.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn mark_email_verified(&self, username: &str, email: &str) -> Result<(), String>;

    async fn confirm_registration(&self, username: &str) -> Result<(), String>;

    /// `password_hash` is already hashed by the caller that issued the receipt
    async fn apply_password_reset(&self, username: &str, password_hash: &str)
        -> Result<(), String>;

    async fn activate_ssh_key(&self, username: &str, key_name: &str) -> Result<(), String>;
}

/// Dispatches one built-in tag against the directory
struct BuiltinHandler {
    tag: &'static str,
    directory: Arc<dyn AccountDirectory>,
}

#[async_trait]
impl CommandHandler for BuiltinHandler {
    async fn execute(&self, arguments: &[String]) -> Result<String, CommandError> {
        let command = ReceiptCommand::parse(self.tag, arguments)?;
        let fail = |reason: String| CommandError::failed(self.tag, reason);

        match command {
            ReceiptCommand::VerifyEmail { username, email } => {
                self.directory
                    .mark_email_verified(&username, &email)
                    .await
                    .map_err(fail)?;
                tracing::info!(user = %username, "Email verified");
                Ok(format!("Email {} has been verified.", email))
            }
            ReceiptCommand::ConfirmRegistration { username } => {
                self.directory
                    .confirm_registration(&username)
                    .await
                    .map_err(fail)?;
                tracing::info!(user = %username, "Registration confirmed");
                Ok("Your registration has been confirmed.".to_string())
            }
            ReceiptCommand::ResetPassword {
                username,
                password_hash,
            } => {
                self.directory
                    .apply_password_reset(&username, &password_hash)
                    .await
                    .map_err(fail)?;
                tracing::info!(user = %username, "Password reset applied");
                Ok("Your password has been reset.".to_string())
            }
            ReceiptCommand::ActivateSshKey { username, key_name } => {
                self.directory
                    .activate_ssh_key(&username, &key_name)
                    .await
                    .map_err(fail)?;
                tracing::info!(user = %username, key = %key_name, "SSH key activated");
                Ok(format!("SSH key {} has been activated.", key_name))
            }
        }
    }
}

/// Register every built-in command against `directory`
pub fn register_builtin_commands(
    registry: &mut CommandRegistry,
    directory: Arc<dyn AccountDirectory>,
) {
    for tag in [
        VERIFY_EMAIL,
        CONFIRM_REGISTRATION,
        RESET_PASSWORD,
        ACTIVATE_SSH_KEY,
    ] {
        registry.register(
            tag,
            Arc::new(BuiltinHandler {
                tag,
                directory: directory.clone(),
            }),
        );
    }
}
