//! In-process lock backend.
//!
//! Mirrors PostgreSQL advisory lock semantics: locks are re-entrant for the
//! session holding them, must be unlocked as many times as they were locked,
//! and are dropped together with the session. Useful for tests and for
//! single-instance deployments without a shared database.

use super::key::LockKey;
use super::session::{LockBackend, LockSession};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Holder {
    session_id: u64,
    count: usize,
}

#[derive(Default)]
struct Shared {
    holders: Mutex<HashMap<LockKey, Holder>>,
    released: Notify,
    next_session_id: AtomicU64,
}

impl Shared {
    fn holders(&self) -> MutexGuard<'_, HashMap<LockKey, Holder>> {
        // The map stays consistent even if a holder panicked mid-operation.
        self.holders.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn try_take(&self, session_id: u64, key: LockKey) -> bool {
        let mut holders = self.holders();
        match holders.get_mut(&key) {
            Some(holder) if holder.session_id == session_id => {
                holder.count += 1;
                true
            }
            Some(_) => false,
            None => {
                holders.insert(
                    key,
                    Holder {
                        session_id,
                        count: 1,
                    },
                );
                true
            }
        }
    }
}

/// Lock backend sharing one lock table between all of its sessions.
#[derive(Clone, Default)]
pub struct MemoryLockBackend {
    shared: Arc<Shared>,
}

impl MemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session directly, without going through the trait object.
    pub fn session(&self) -> MemoryLockSession {
        let id = self.shared.next_session_id.fetch_add(1, Ordering::SeqCst);
        MemoryLockSession {
            id,
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_locked(&self, key: LockKey) -> bool {
        self.shared.holders().contains_key(&key)
    }
}

#[async_trait]
impl LockBackend for MemoryLockBackend {
    async fn open_session(&self) -> Result<Arc<dyn LockSession>> {
        Ok(Arc::new(self.session()))
    }
}

pub struct MemoryLockSession {
    id: u64,
    shared: Arc<Shared>,
}

#[async_trait]
impl LockSession for MemoryLockSession {
    async fn try_lock(&self, key: LockKey) -> Result<bool> {
        Ok(self.shared.try_take(self.id, key))
    }

    async fn lock(&self, key: LockKey) -> Result<()> {
        loop {
            let released = self.shared.released.notified();
            tokio::pin!(released);
            // Register before checking so a release in between is not missed.
            released.as_mut().enable();

            if self.shared.try_take(self.id, key) {
                return Ok(());
            }
            released.await;
        }
    }

    async fn unlock(&self, key: LockKey) -> Result<bool> {
        let freed = {
            let mut holders = self.shared.holders();
            match holders.get_mut(&key) {
                Some(holder) if holder.session_id == self.id => {
                    holder.count -= 1;
                    if holder.count == 0 {
                        holders.remove(&key);
                        Some(true)
                    } else {
                        Some(false)
                    }
                }
                _ => None,
            }
        };

        match freed {
            Some(true) => {
                self.shared.released.notify_waiters();
                Ok(true)
            }
            Some(false) => Ok(true),
            None => Ok(false),
        }
    }
}

impl Drop for MemoryLockSession {
    fn drop(&mut self) {
        let released = {
            let mut holders = self.shared.holders();
            let before = holders.len();
            holders.retain(|_, holder| holder.session_id != self.id);
            before - holders.len()
        };

        if released > 0 {
            debug!(
                "Session {} closed while holding {} lock(s), releasing",
                self.id, released
            );
            self.shared.released.notify_waiters();
        }
    }
}
