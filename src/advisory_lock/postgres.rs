//! PostgreSQL lock backend using session-level advisory locks.
//!
//! Every session opens its own connection. The connection is the owner of the
//! advisory lock on the server side, so if the process dies or the connection
//! drops, PostgreSQL releases the lock on its own.

use super::key::LockKey;
use super::session::{LockBackend, LockSession};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

pub struct PostgresLockBackend {
    database_url: String,
}

impl PostgresLockBackend {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl LockBackend for PostgresLockBackend {
    async fn open_session(&self) -> Result<Arc<dyn LockSession>> {
        let session = PostgresLockSession::connect(&self.database_url).await?;
        Ok(Arc::new(session))
    }
}

/// A single dedicated PostgreSQL connection.
///
/// Dropping the session closes the connection, which releases any advisory
/// lock still held by it.
pub struct PostgresLockSession {
    client: Client,
}

impl PostgresLockSession {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .context("Failed to connect to PostgreSQL")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL lock connection error: {}", e);
            }
        });

        Ok(Self { client })
    }
}

#[async_trait]
impl LockSession for PostgresLockSession {
    async fn try_lock(&self, key: LockKey) -> Result<bool> {
        debug!("pg_try_advisory_lock{}", key);
        let row = self
            .client
            .query_one("SELECT pg_try_advisory_lock($1, $2)", &[&key.high, &key.low])
            .await
            .context("pg_try_advisory_lock failed")?;
        Ok(row.get::<_, bool>(0))
    }

    async fn lock(&self, key: LockKey) -> Result<()> {
        debug!("pg_advisory_lock{}", key);
        // Returns void, so only the completion of the statement matters.
        self.client
            .execute("SELECT pg_advisory_lock($1, $2)", &[&key.high, &key.low])
            .await
            .context("pg_advisory_lock failed")?;
        Ok(())
    }

    async fn unlock(&self, key: LockKey) -> Result<bool> {
        debug!("pg_advisory_unlock{}", key);
        let row = self
            .client
            .query_one("SELECT pg_advisory_unlock($1, $2)", &[&key.high, &key.low])
            .await
            .context("pg_advisory_unlock failed")?;
        Ok(row.get::<_, bool>(0))
    }
}
