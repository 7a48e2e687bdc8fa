//! Named cross-process locks backed by database advisory locks.
//!
//! A lock name is hashed to a [`LockKey`] and taken through a [`LockSession`],
//! which wraps one database connection. The database, not this process,
//! guarantees that a given key is held by at most one session at a time.

mod key;
mod lock;
mod memory;
mod postgres;
mod session;

pub use key::LockKey;
pub use lock::{AdvisoryLock, LockError, LockState};
pub use memory::{MemoryLockBackend, MemoryLockSession};
pub use postgres::{PostgresLockBackend, PostgresLockSession};
pub use session::{LockBackend, LockSession};

#[cfg(any(test, feature = "mock"))]
pub use session::MockLockSession;
