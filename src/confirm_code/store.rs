//! Confirm Code Store
//!
//! In-process table of live codes keyed by `(subject, purpose)`. Nothing
//! survives a restart; users simply request a new code.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeKey {
    pub subject: String,
    pub purpose: String,
}

impl CodeKey {
    pub fn new(subject: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            purpose: purpose.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodeEntry {
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// `None` when mismatches are not bounded
    pub attempts_remaining: Option<u32>,
}

impl CodeEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Whole-table lock. Contention is low and every operation is short.
#[derive(Debug, Default)]
pub struct ConfirmCodeStore {
    entries: Mutex<HashMap<CodeKey, CodeEntry>>,
}

impl ConfirmCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Returns whether a previous entry was replaced.
    pub fn insert(&self, key: CodeKey, entry: CodeEntry) -> bool {
        self.entries.lock().insert(key, entry).is_some()
    }

    /// Run `f` on the slot for `key` while holding the lock.
    ///
    /// Setting the slot to `None` deletes the entry; anything left in it is
    /// written back.
    pub fn update<R>(&self, key: &CodeKey, f: impl FnOnce(&mut Option<CodeEntry>) -> R) -> R {
        let mut entries = self.entries.lock();
        let mut slot = entries.remove(key);
        let result = f(&mut slot);
        if let Some(entry) = slot {
            entries.insert(key.clone(), entry);
        }
        result
    }

    pub fn remove(&self, key: &CodeKey) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Drop every entry expired at `now`. Returns how many were removed.
    pub fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(code: &str, expires_at: DateTime<Utc>) -> CodeEntry {
        CodeEntry {
            code: code.to_string(),
            issued_at: expires_at - Duration::minutes(10),
            expires_at,
            attempts_remaining: None,
        }
    }

    #[test]
    fn test_insert_overwrites() {
        let store = ConfirmCodeStore::new();
        let key = CodeKey::new("bob", "login-2fa");
        let expires_at = Utc::now() + Duration::minutes(10);

        assert!(!store.insert(key.clone(), entry("AAAAAA", expires_at)));
        assert!(store.insert(key.clone(), entry("BBBBBB", expires_at)));
        assert_eq!(store.len(), 1);

        let code = store.update(&key, |slot| slot.as_ref().map(|e| e.code.clone()));
        assert_eq!(code.as_deref(), Some("BBBBBB"));
    }

    #[test]
    fn test_update_can_delete() {
        let store = ConfirmCodeStore::new();
        let key = CodeKey::new("bob", "login-2fa");
        store.insert(key.clone(), entry("AAAAAA", Utc::now()));

        store.update(&key, |slot| *slot = None);
        assert!(store.is_empty());
        assert!(!store.remove(&key));
    }

    #[test]
    fn test_keys_are_purpose_scoped() {
        let store = ConfirmCodeStore::new();
        let expires_at = Utc::now() + Duration::minutes(10);
        store.insert(CodeKey::new("bob", "login-2fa"), entry("AAAAAA", expires_at));
        store.insert(CodeKey::new("bob", "delete-repo"), entry("BBBBBB", expires_at));

        assert_eq!(store.len(), 2);
        assert!(store.remove(&CodeKey::new("bob", "login-2fa")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_expired() {
        let store = ConfirmCodeStore::new();
        let now = Utc::now();
        store.insert(CodeKey::new("a", "p"), entry("A", now - Duration::seconds(1)));
        store.insert(CodeKey::new("b", "p"), entry("B", now));
        store.insert(CodeKey::new("c", "p"), entry("C", now + Duration::minutes(1)));

        assert_eq!(store.remove_expired(now), 1);
        assert_eq!(store.len(), 2);
    }
}
