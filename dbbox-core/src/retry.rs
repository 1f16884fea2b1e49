//! Retrying execution of a unit of work against a pooled connection
//!
//! Each attempt checks a connection out of the pool. A failed attempt throws
//! the connection away and replaces it, so a dropped socket or a deadlocked
//! session is not handed to the next caller.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{error, warn};

use crate::config::RetryPolicy;
use crate::connection::BoxConnection;
use crate::error::{DbError, Result};
use crate::pool::ConnectionPool;

pub struct RetryingExecutor {
    pool: Arc<ConnectionPool>,
    max_attempts: u32,
    policy: RetryPolicy,
}

impl RetryingExecutor {
    pub fn new(pool: Arc<ConnectionPool>, max_attempts: u32, policy: RetryPolicy) -> Self {
        Self {
            pool,
            max_attempts: max_attempts.max(1),
            policy,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn should_retry(&self, err: &DbError) -> bool {
        match self.policy {
            RetryPolicy::All => true,
            RetryPolicy::TransientOnly => err.is_transient(),
        }
    }

    /// Run `work` with a pooled connection, up to `max_attempts` times.
    pub async fn run<T, F>(&self, operation: &str, mut work: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut BoxConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut last_error = None;
        let mut attempts = 0;

        for attempt in 1..=self.max_attempts {
            attempts = attempt;
            let mut conn = match self.pool.acquire().await {
                Ok(conn) => conn,
                Err(err) => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "could not acquire connection"
                    );
                    let retry = self.should_retry(&err);
                    last_error = Some(err);
                    if retry {
                        continue;
                    }
                    break;
                }
            };

            match work(&mut *conn).await {
                Ok(value) => {
                    conn.release().await;
                    return Ok(value);
                }
                Err(err) => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "operation failed"
                    );
                    if self.should_retry(&err) {
                        conn.discard().await;
                        last_error = Some(err);
                    } else {
                        // the statement was at fault, not the connection
                        conn.release().await;
                        return Err(err);
                    }
                }
            }
        }

        let cause = last_error.unwrap_or(DbError::PoolClosed);
        error!(operation, attempts, error = %cause, "operation failed in every attempt");
        Err(DbError::exhausted(operation, attempts, cause))
    }
}
