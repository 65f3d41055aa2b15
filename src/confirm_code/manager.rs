//! Confirm Code Manager
//!
//! Issues short human-typable codes bound to a subject and purpose (email
//! 2FA, dangerous-action confirmation) and burns them on first correct use.

use std::sync::Arc;

use chrono::Duration;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

use super::store::{CodeEntry, CodeKey, ConfirmCodeStore};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfirmCodeConfig, ConfirmCodeKind, MAX_CODE_TIMEOUT_MINUTES};

/// Uppercase alphanumerics without the look-alikes 0/O, 1/I/L
pub const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

pub const MIN_CODE_LENGTH: usize = 6;
pub const MAX_CODE_LENGTH: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum ConfirmCodeError {
    #[error("Subject and purpose must not be empty")]
    InvalidKey,

    #[error("Confirm code generation failed: {0}")]
    GenerationFailure(String),

    #[error("Invalid confirm code configuration: {0}")]
    InvalidConfig(String),

    #[error("Confirm code expiry is out of range")]
    ExpiryOutOfRange,
}

#[derive(Debug)]
pub struct ConfirmCodeManager {
    store: ConfirmCodeStore,
    timeout: Duration,
    code_length: usize,
    max_attempts: Option<u32>,
    clock: Arc<dyn Clock>,
}

impl ConfirmCodeManager {
    /// Build a manager from validated settings
    pub fn from_config(config: &ConfirmCodeConfig) -> Result<Self, ConfirmCodeError> {
        if !(1..=MAX_CODE_TIMEOUT_MINUTES).contains(&config.default_timeout_minutes) {
            return Err(ConfirmCodeError::InvalidConfig(format!(
                "timeout must be between 1 and {} minutes, got {}",
                MAX_CODE_TIMEOUT_MINUTES, config.default_timeout_minutes
            )));
        }
        let timeout = Duration::try_minutes(config.default_timeout_minutes).ok_or_else(|| {
            ConfirmCodeError::InvalidConfig("timeout out of range".to_string())
        })?;
        if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&config.code_length) {
            return Err(ConfirmCodeError::InvalidConfig(format!(
                "code length must be between {} and {}, got {}",
                MIN_CODE_LENGTH, MAX_CODE_LENGTH, config.code_length
            )));
        }

        let store = match config.kind {
            ConfirmCodeKind::InMemory => ConfirmCodeStore::new(),
        };

        Ok(Self {
            store,
            timeout,
            code_length: config.code_length,
            max_attempts: (config.max_attempts > 0).then_some(config.max_attempts),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn key(subject: &str, purpose: &str) -> Result<CodeKey, ConfirmCodeError> {
        if subject.is_empty() || purpose.is_empty() {
            return Err(ConfirmCodeError::InvalidKey);
        }
        Ok(CodeKey::new(subject, purpose))
    }

    fn generate_code(&self) -> Result<String, ConfirmCodeError> {
        // 248 is the largest multiple of 31 below 256; rejecting above it
        // keeps every symbol equally likely.
        let limit = 256 - (256 % CODE_ALPHABET.len());
        let mut code = String::with_capacity(self.code_length);
        let mut buf = [0u8; 16];

        while code.len() < self.code_length {
            OsRng
                .try_fill_bytes(&mut buf)
                .map_err(|e| ConfirmCodeError::GenerationFailure(e.to_string()))?;
            for &b in buf.iter().filter(|&&b| (b as usize) < limit) {
                if code.len() == self.code_length {
                    break;
                }
                code.push(CODE_ALPHABET[b as usize % CODE_ALPHABET.len()] as char);
            }
        }
        Ok(code)
    }

    /// Issue a fresh code, replacing any live one for the same key
    pub fn issue_code(&self, subject: &str, purpose: &str) -> Result<String, ConfirmCodeError> {
        let key = Self::key(subject, purpose)?;
        let code = self.generate_code()?;
        let issued_at = self.clock.now();
        let expires_at = issued_at
            .checked_add_signed(self.timeout)
            .ok_or(ConfirmCodeError::ExpiryOutOfRange)?;

        let replaced = self.store.insert(
            key,
            CodeEntry {
                code: code.clone(),
                issued_at,
                expires_at,
                attempts_remaining: self.max_attempts,
            },
        );

        tracing::info!(
            subject = %subject,
            purpose = %purpose,
            replaced,
            expires_at = %expires_at,
            "Confirm code issued"
        );
        Ok(code)
    }

    /// Check `candidate` against the live code and burn it on a match.
    ///
    /// Absent, expired and mismatched codes are ordinary `false` outcomes.
    pub fn verify_code(
        &self,
        subject: &str,
        purpose: &str,
        candidate: &str,
    ) -> Result<bool, ConfirmCodeError> {
        let key = Self::key(subject, purpose)?;
        let now = self.clock.now();

        let verified = self.store.update(&key, |slot| {
            let Some(entry) = slot.as_mut() else {
                return false;
            };

            if entry.is_expired_at(now) {
                *slot = None;
                return false;
            }

            if bool::from(entry.code.as_bytes().ct_eq(candidate.as_bytes())) {
                *slot = None;
                return true;
            }

            if let Some(remaining) = entry.attempts_remaining.as_mut() {
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    tracing::warn!(
                        subject = %subject,
                        purpose = %purpose,
                        "Confirm code locked after too many wrong attempts"
                    );
                    *slot = None;
                }
            }
            false
        });

        tracing::debug!(subject = %subject, purpose = %purpose, verified, "Confirm code checked");
        Ok(verified)
    }

    /// Drop the live code for a key, if any
    pub fn invalidate(&self, subject: &str, purpose: &str) -> Result<bool, ConfirmCodeError> {
        let key = Self::key(subject, purpose)?;
        Ok(self.store.remove(&key))
    }

    /// Remove codes that expired but were never looked up again
    pub fn sweep_expired(&self) -> usize {
        let removed = self.store.remove_expired(self.clock.now());
        if removed > 0 {
            tracing::debug!(removed, "Swept expired confirm codes");
        }
        removed
    }

    /// Number of entries currently held, expired or not
    pub fn live_codes(&self) -> usize {
        self.store.len()
    }
}
