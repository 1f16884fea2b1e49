//! Bounded connection pool
//!
//! Capacity is a semaphore with one permit per connection slot. A
//! [`Checkout`] owns its permit until it is released, discarded or dropped,
//! so idle + checked-out never exceeds `max_size` and a cancelled caller
//! cannot keep a slot. Acquirers wait for a permit rather than failing when
//! the pool is busy.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error, info, warn};

use crate::connection::{BoxConnection, Connector};
use crate::error::{DbError, Result};

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub idle: usize,
    pub checked_out: usize,
    pub max_size: usize,
}

struct Idle {
    conns: Vec<BoxConnection>,
    closed: bool,
}

pub struct ConnectionPool {
    name: &'static str,
    connector: Arc<dyn Connector>,
    idle: Mutex<Idle>,
    slots: Semaphore,
    max_size: usize,
}

impl ConnectionPool {
    /// Open a pool, eagerly connecting `initial_size` connections.
    pub async fn open(
        name: &'static str,
        connector: Arc<dyn Connector>,
        max_size: usize,
        initial_size: usize,
    ) -> Result<Self> {
        if initial_size > max_size {
            return Err(DbError::config(format!(
                "initial size {initial_size} exceeds max size {max_size} for pool '{name}'"
            )));
        }

        let mut conns = Vec::with_capacity(max_size);
        for _ in 0..initial_size {
            conns.push(connector.connect().await?);
        }
        info!(pool = name, initial_size, max_size, "connection pool ready");

        Ok(Self {
            name,
            connector,
            idle: Mutex::new(Idle {
                conns,
                closed: false,
            }),
            slots: Semaphore::new(max_size),
            max_size,
        })
    }

    fn lock_idle(&self) -> MutexGuard<'_, Idle> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a connection and take exclusive ownership of it.
    ///
    /// Opens a new connection when a slot is free but nothing is idle.
    pub async fn acquire(&self) -> Result<Checkout<'_>> {
        let slot = self
            .slots
            .acquire()
            .await
            .map_err(|_| DbError::PoolClosed)?;

        let pooled = self.lock_idle().conns.pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => {
                debug!(pool = self.name, "no idle connection, opening a new one");
                // on failure the permit drops here and the slot is free again
                self.connector.connect().await?
            }
        };
        Ok(Checkout {
            pool: self,
            conn,
            slot,
        })
    }

    async fn put_back(&self, conn: BoxConnection) {
        let leftover = {
            let mut idle = self.lock_idle();
            if idle.closed {
                Some(conn)
            } else {
                idle.conns.push(conn);
                None
            }
        };
        if let Some(mut conn) = leftover {
            if let Err(err) = conn.close().await {
                warn!(pool = self.name, error = %err, "failed to close connection released after shutdown");
            }
        }
    }

    async fn replace(&self, mut conn: BoxConnection) {
        if let Err(err) = conn.close().await {
            error!(pool = self.name, error = %err, "error closing broken connection");
        }
        drop(conn);

        if self.lock_idle().closed {
            return;
        }

        match self.connector.connect().await {
            Ok(fresh) => self.put_back(fresh).await,
            Err(err) => {
                warn!(pool = self.name, error = %err, "could not open replacement connection");
            }
        }
    }

    /// Close every idle connection and refuse further acquires.
    ///
    /// Close failures are logged and the first one is returned; nothing is
    /// retried. Connections still checked out are closed when released.
    pub async fn shutdown(&self) -> Result<()> {
        self.slots.close();
        let drained = {
            let mut idle = self.lock_idle();
            idle.closed = true;
            std::mem::take(&mut idle.conns)
        };

        let count = drained.len();
        let mut first_error = None;
        for mut conn in drained {
            if let Err(err) = conn.close().await {
                error!(pool = self.name, error = %err, "error closing connection during shutdown");
                first_error.get_or_insert(err);
            }
        }
        info!(pool = self.name, closed = count, "connection pool shut down");

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            idle: self.lock_idle().conns.len(),
            checked_out: self.max_size.saturating_sub(self.slots.available_permits()),
            max_size: self.max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn is_closed(&self) -> bool {
        self.lock_idle().closed
    }
}

/// A connection checked out of a [`ConnectionPool`].
///
/// Holds one pool slot for as long as it lives. Dropping it without
/// `release` or `discard` (a cancelled caller) drops the connection and
/// frees the slot, and a later `acquire` reopens it lazily.
pub struct Checkout<'p> {
    pool: &'p ConnectionPool,
    conn: BoxConnection,
    slot: SemaphorePermit<'p>,
}

impl Checkout<'_> {
    /// Hand a healthy connection back.
    pub async fn release(self) {
        let Checkout { pool, conn, slot } = self;
        pool.put_back(conn).await;
        drop(slot);
    }

    /// Close a broken connection and put a fresh one in its place.
    ///
    /// If no replacement can be opened the slot is freed, and a later
    /// `acquire` reopens it lazily.
    pub async fn discard(self) {
        let Checkout { pool, conn, slot } = self;
        pool.replace(conn).await;
        drop(slot);
    }
}

impl Deref for Checkout<'_> {
    type Target = BoxConnection;

    fn deref(&self) -> &BoxConnection {
        &self.conn
    }
}

impl DerefMut for Checkout<'_> {
    fn deref_mut(&mut self) -> &mut BoxConnection {
        &mut self.conn
    }
}
