//! Command Registry
//!
//! Maps a command tag to the handler that performs the deferred side effect.
//! Commands are registered explicitly at startup; unknown tags are rejected.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::CommandError;

pub const VERIFY_EMAIL: &str = "verify-email";
pub const CONFIRM_REGISTRATION: &str = "confirm-registration";
pub const RESET_PASSWORD: &str = "reset-password";
pub const ACTIVATE_SSH_KEY: &str = "activate-ssh-key";

/// Performs the side effect bound to a receipt.
///
/// Handlers receive the argument list recorded at issuance. The registry
/// guarantees at most one invocation per receipt; handlers should still
/// tolerate repeating the same action for a different receipt.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, arguments: &[String]) -> Result<String, CommandError>;
}

/// Adapter so plain functions and closures can be registered
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(&[String]) -> Result<String, CommandError> + Send + Sync,
{
    async fn execute(&self, arguments: &[String]) -> Result<String, CommandError> {
        (self.0)(arguments)
    }
}

/// Table of registered commands
#[derive(Clone, Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `tag`, replacing any previous one
    pub fn register(&mut self, tag: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        let tag = tag.into();
        if self.handlers.insert(tag.clone(), handler).is_some() {
            tracing::warn!(command = %tag, "Replaced previously registered command handler");
        }
    }

    pub fn register_fn<F>(&mut self, tag: impl Into<String>, f: F)
    where
        F: Fn(&[String]) -> Result<String, CommandError> + Send + Sync + 'static,
    {
        self.register(tag, Arc::new(FnHandler(f)));
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    /// Registered tags, sorted
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Run the handler for `tag`. Unknown tags fail before anything executes.
    pub async fn dispatch(&self, tag: &str, arguments: &[String]) -> Result<String, CommandError> {
        let handler = self
            .handlers
            .get(tag)
            .ok_or_else(|| CommandError::NotFound(tag.to_string()))?;
        handler.execute(arguments).await
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

/// Typed form of the built-in receipt commands.
///
/// Converts to and from the stored `(tag, arguments)` pair, so issuing code
/// can't get the argument order wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptCommand {
    VerifyEmail { username: String, email: String },
    ConfirmRegistration { username: String },
    ResetPassword { username: String, password_hash: String },
    ActivateSshKey { username: String, key_name: String },
}

impl ReceiptCommand {
    pub fn tag(&self) -> &'static str {
        match self {
            ReceiptCommand::VerifyEmail { .. } => VERIFY_EMAIL,
            ReceiptCommand::ConfirmRegistration { .. } => CONFIRM_REGISTRATION,
            ReceiptCommand::ResetPassword { .. } => RESET_PASSWORD,
            ReceiptCommand::ActivateSshKey { .. } => ACTIVATE_SSH_KEY,
        }
    }

    pub fn into_arguments(self) -> Vec<String> {
        match self {
            ReceiptCommand::VerifyEmail { username, email } => vec![username, email],
            ReceiptCommand::ConfirmRegistration { username } => vec![username],
            ReceiptCommand::ResetPassword {
                username,
                password_hash,
            } => vec![username, password_hash],
            ReceiptCommand::ActivateSshKey { username, key_name } => vec![username, key_name],
        }
    }

    /// Rebuild a typed command from a stored tag and argument list
    pub fn parse(tag: &str, arguments: &[String]) -> Result<Self, CommandError> {
        let expect = |n: usize| -> Result<(), CommandError> {
            if arguments.len() == n {
                Ok(())
            } else {
                Err(CommandError::invalid_arguments(
                    tag,
                    format!("expected {} arguments, got {}", n, arguments.len()),
                ))
            }
        };

        match tag {
            VERIFY_EMAIL => {
                expect(2)?;
                Ok(ReceiptCommand::VerifyEmail {
                    username: arguments[0].clone(),
                    email: arguments[1].clone(),
                })
            }
            CONFIRM_REGISTRATION => {
                expect(1)?;
                Ok(ReceiptCommand::ConfirmRegistration {
                    username: arguments[0].clone(),
                })
            }
            RESET_PASSWORD => {
                expect(2)?;
                Ok(ReceiptCommand::ResetPassword {
                    username: arguments[0].clone(),
                    password_hash: arguments[1].clone(),
                })
            }
            ACTIVATE_SSH_KEY => {
                expect(2)?;
                Ok(ReceiptCommand::ActivateSshKey {
                    username: arguments[0].clone(),
                    key_name: arguments[1].clone(),
                })
            }
            other => Err(CommandError::NotFound(other.to_string())),
        }
    }
}
