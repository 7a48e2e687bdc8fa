use super::key::LockKey;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// The database primitives behind an advisory lock.
///
/// A session is bound to exactly one database connection. Advisory locks are
/// owned by that connection: every primitive of one acquire/release cycle must
/// run on the same session, and closing the session releases whatever it still
/// holds.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait LockSession: Send + Sync {
    /// Non-blocking acquire. Returns false if another session holds the lock.
    async fn try_lock(&self, key: LockKey) -> Result<bool>;

    /// Blocking acquire. Returns once the lock is held, with no timeout.
    async fn lock(&self, key: LockKey) -> Result<()>;

    /// Returns false if this session did not hold the lock.
    async fn unlock(&self, key: LockKey) -> Result<bool>;
}

/// Source of lock sessions.
///
/// Every call to `open_session` must yield a session on its own connection.
/// Handing out pooled connections that are shared between callers would let two
/// holders observe the same (re-entrant) lock as free.
#[async_trait]
pub trait LockBackend: Send + Sync {
    async fn open_session(&self) -> Result<Arc<dyn LockSession>>;
}
