use super::key::LockKey;
use super::session::LockSession;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised by [`AdvisoryLock`].
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Lock is already acquired by this instance")]
    AlreadyAcquired,

    #[error("Cannot release a lock that was not acquired by this instance")]
    NotAcquired,

    #[error("Failed to acquire advisory lock '{name}': {message}")]
    Acquisition { name: String, message: String },

    #[error("Failed to release advisory lock '{name}': {message}")]
    Release { name: String, message: String },
}

/// Local view of whether this instance holds the database lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Idle,
    Held,
}

/// A named, cross-process mutual exclusion lock.
///
/// Instances are meant for a single acquire/release cycle. Create a new one,
/// on a new session, for every attempt.
pub struct AdvisoryLock {
    session: Arc<dyn LockSession>,
    name: String,
    key: LockKey,
    state: LockState,
}

impl AdvisoryLock {
    pub fn new(session: Arc<dyn LockSession>, name: &str) -> Result<Self, LockError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LockError::InvalidArgument(
                "Lock name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            session,
            name: name.to_string(),
            key: LockKey::from_name(name),
            state: LockState::Idle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> LockKey {
        self.key
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn acquired(&self) -> bool {
        self.state == LockState::Held
    }

    /// Try to take the lock without waiting.
    ///
    /// Returns `Ok(false)` when another session holds it.
    pub async fn try_acquire(&mut self) -> Result<bool, LockError> {
        self.ensure_idle()?;

        let obtained = self
            .session
            .try_lock(self.key)
            .await
            .map_err(|e| self.acquisition_error(e))?;

        if obtained {
            self.state = LockState::Held;
            debug!("Acquired advisory lock {} {}", self.name, self.key);
        } else {
            debug!(
                "Advisory lock {} {} is held by another session",
                self.name, self.key
            );
        }
        Ok(obtained)
    }

    /// Wait until the lock is available and take it.
    pub async fn acquire(&mut self) -> Result<(), LockError> {
        self.ensure_idle()?;

        self.session
            .lock(self.key)
            .await
            .map_err(|e| self.acquisition_error(e))?;

        self.state = LockState::Held;
        debug!("Acquired advisory lock {} {}", self.name, self.key);
        Ok(())
    }

    /// Release the lock.
    ///
    /// The instance goes back to `Idle` whatever the outcome. On failure the
    /// database side may still hold the lock until the session ends.
    pub async fn release(&mut self) -> Result<(), LockError> {
        if self.state != LockState::Held {
            return Err(LockError::NotAcquired);
        }
        self.state = LockState::Idle;

        match self.session.unlock(self.key).await {
            Ok(true) => {
                debug!("Released advisory lock {} {}", self.name, self.key);
                Ok(())
            }
            Ok(false) => Err(LockError::Release {
                name: self.name.clone(),
                message: "lock was not held by this session".to_string(),
            }),
            Err(e) => Err(LockError::Release {
                name: self.name.clone(),
                message: format!("{:#}", e),
            }),
        }
    }

    fn ensure_idle(&self) -> Result<(), LockError> {
        match self.state {
            LockState::Idle => Ok(()),
            LockState::Held => Err(LockError::AlreadyAcquired),
        }
    }

    fn acquisition_error(&self, error: anyhow::Error) -> LockError {
        LockError::Acquisition {
            name: self.name.clone(),
            message: format!("{:#}", error),
        }
    }
}

impl std::fmt::Debug for AdvisoryLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisoryLock")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("state", &self.state)
            .finish()
    }
}
