//! Per-user scan lock registry.
//!
//! At most one scan per username at a time. A second request is rejected
//! immediately with [`ScoutError::ScanAlreadyInProgress`]; the guard releases
//! the lock on every exit path, including timeouts and panics.

use crate::error::{Result, ScoutError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct UserLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `username` or fail without waiting.
    pub fn try_acquire(&self, username: &str) -> Result<UserLockGuard> {
        if !self.held().insert(username.to_string()) {
            return Err(ScoutError::ScanAlreadyInProgress(username.to_string()));
        }
        debug!(username, "Acquired scan lock");
        Ok(UserLockGuard {
            held: Arc::clone(&self.held),
            username: username.to_string(),
        })
    }

    pub fn is_locked(&self, username: &str) -> bool {
        self.held().contains(username)
    }

    fn held(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Releases the user's scan lock when dropped.
#[derive(Debug)]
pub struct UserLockGuard {
    held: Arc<Mutex<HashSet<String>>>,
    username: String,
}

impl UserLockGuard {
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.username);
        debug!(username = %self.username, "Released scan lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected() {
        let locks = UserLocks::new();
        let guard = locks.try_acquire("alice").unwrap();
        assert_eq!(guard.username(), "alice");

        let err = locks.try_acquire("alice").unwrap_err();
        assert!(err.is_busy());

        // Other users are independent
        let _bob = locks.try_acquire("bob").unwrap();
        assert!(locks.is_locked("alice"));

        drop(guard);
        assert!(!locks.is_locked("alice"));
        assert!(locks.try_acquire("alice").is_ok());
    }

    #[test]
    fn test_lock_released_on_panic() {
        let locks = UserLocks::new();
        let cloned = locks.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = cloned.try_acquire("alice").unwrap();
            panic!("scan blew up");
        });
        assert!(result.is_err());
        assert!(!locks.is_locked("alice"));
    }
}
