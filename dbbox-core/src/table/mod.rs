//! Table-level write-back row cache
//!
//! A `Table` caches whole rows keyed by the identifier column. Reads are
//! served from the cache once a row is loaded, writes mutate the cached copy,
//! and `update` flushes the row back with a single upsert.
//!
//! Every key has its own async lock. Loads, mutations and flushes of one key
//! are serialized on it; different keys never wait on each other.

mod column;

pub use column::{CachedRow, Column, TableEntry};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::builder::{SelectBuilder, UpdateBuilder};
use crate::dialect::Dialect;
use crate::dispatch::{DataSource, DispatchHandle, WeakDataSource};
use crate::error::{DbError, Result};
use crate::result::ResultSet;
use crate::value::Value;

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_]+$").unwrap_or_else(|e| panic!("invalid name pattern: {e}"))
});

/// Reject names that would have to be quoted or could smuggle SQL.
pub(crate) fn check_name(kind: &str, name: &str) -> Result<()> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(DbError::invalid_argument(format!(
            "{kind} name '{name}' may only contain letters, digits and underscores"
        )))
    }
}

/// Cache counters since the table was opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub flushes: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    flushes: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TableStats {
        TableStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<CachedRow>>>;

struct TableInner {
    source: WeakDataSource,
    dialect: Dialect,
    name: String,
    identifier: String,
    identifier_index: usize,
    columns: Vec<Arc<Column>>,
    ttl: Option<Duration>,
    slots: Mutex<HashMap<String, Slot>>,
    counters: Counters,
}

/// Handle to one table and its row cache. Clones share the cache.
///
/// A table does not keep its data source alive. Once every `DataSource`
/// handle is dropped, operations that reach the database fail with
/// `PoolClosed`.
#[derive(Clone)]
pub struct Table {
    inner: Arc<TableInner>,
}

impl Table {
    /// Discover the table's columns and build an empty cache.
    ///
    /// Usually reached through [`DataSource::table`], which keeps one `Table`
    /// per name.
    pub async fn open(source: DataSource, name: &str, identifier: &str) -> Result<Self> {
        check_name("table", name)?;
        check_name("identifier", identifier)?;

        let shape = source.columns(format!("SELECT * FROM {name}")).await?;
        let columns: Vec<Arc<Column>> = shape
            .iter()
            .map(|info| Arc::new(Column::from(info)))
            .collect();
        let identifier_index = columns
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(identifier))
            .ok_or_else(|| DbError::unknown_column(name, identifier))?;

        debug!(table = name, identifier, columns = columns.len(), "table opened");

        Ok(Self {
            inner: Arc::new(TableInner {
                source: source.downgrade(),
                dialect: source.dialect(),
                ttl: source.config().cache.ttl(),
                name: name.to_string(),
                identifier: identifier.to_string(),
                identifier_index,
                columns,
                slots: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    /// Columns in table order
    pub fn columns(&self) -> Vec<&Column> {
        self.inner.columns.iter().map(AsRef::as_ref).collect()
    }

    pub fn stats(&self) -> TableStats {
        self.inner.counters.snapshot()
    }

    fn source(&self) -> Result<DataSource> {
        self.inner.source.upgrade()
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect
    }

    fn column_index(&self, column: &str) -> Result<usize> {
        self.inner
            .columns
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(column))
            .ok_or_else(|| DbError::unknown_column(&self.inner.name, column))
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, key: &str) -> Slot {
        self.lock_slots().entry(key.to_string()).or_default().clone()
    }

    /// Drop the key's slot if it is empty and nobody else is using it.
    fn prune(&self, key: &str) {
        let mut slots = self.lock_slots();
        let unused = slots.get(key).is_some_and(|slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|row| row.is_none())
        });
        if unused {
            slots.remove(key);
        }
    }

    /// Bind the key with the identifier column's type so engines without
    /// implicit text-to-number comparison still match it.
    fn key_param(&self, key: &str) -> Value {
        let raw = Value::from(key);
        self.inner.columns[self.inner.identifier_index]
            .data_type()
            .coerce(&raw)
            .unwrap_or(raw)
    }

    fn key_predicate(&self) -> String {
        format!("{} = {}", self.inner.identifier, self.dialect().placeholder(1))
    }

    async fn load(&self, key: &str) -> Result<CachedRow> {
        let inner = &self.inner;
        let sql = format!("SELECT * FROM {} WHERE {}", inner.name, self.key_predicate());
        let result = self.source()?.query(sql, vec![self.key_param(key)]).await?;
        Counters::bump(&inner.counters.loads);

        let values = result
            .into_rows()
            .into_iter()
            .next()
            .ok_or_else(|| DbError::row_not_found(&inner.name, key))?;
        if values.len() != inner.columns.len() {
            return Err(DbError::invalid_argument(format!(
                "table '{}' has {} columns but the row for '{key}' has {}; reopen the table",
                inner.name,
                inner.columns.len(),
                values.len()
            )));
        }

        debug!(table = %inner.name, key, "row loaded");
        let entries = inner
            .columns
            .iter()
            .cloned()
            .zip(values)
            .map(|(column, value)| TableEntry::new(column, value))
            .collect();
        Ok(CachedRow::new(entries))
    }

    /// Make sure the slot holds a live row, loading it if needed.
    async fn ensure_loaded<'a>(
        &self,
        key: &str,
        cached: &'a mut Option<CachedRow>,
    ) -> Result<&'a mut CachedRow> {
        let counters = &self.inner.counters;
        let fresh = cached.as_ref().is_some_and(|row| row.is_fresh(self.inner.ttl));

        if fresh {
            Counters::bump(&counters.hits);
        } else {
            if cached.take().is_some() {
                debug!(table = %self.inner.name, key, "cached row expired");
                Counters::bump(&counters.evictions);
            }
            Counters::bump(&counters.misses);
            *cached = Some(self.load(key).await?);
        }

        cached
            .as_mut()
            .ok_or_else(|| DbError::row_not_found(&self.inner.name, key))
    }

    /// Whether a live row for `key` is in the cache
    pub async fn is_cached(&self, key: &str) -> bool {
        let Some(slot) = self.lock_slots().get(key).cloned() else {
            return false;
        };
        let cached = slot.lock().await;
        let fresh = cached.as_ref().is_some_and(|row| row.is_fresh(self.inner.ttl));
        fresh
    }

    /// True when at least one row has `key` as its identifier. Never cached.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let sql = format!("SELECT * FROM {} WHERE {}", self.inner.name, self.key_predicate());
        let result = self.source()?.query(sql, vec![self.key_param(key)]).await?;
        Ok(!result.is_empty())
    }

    /// Read one column of the row for `key`, loading the row on a miss.
    pub async fn get(&self, key: &str, column: &str) -> Result<TableEntry> {
        let index = self.column_index(column)?;

        let entry = {
            let slot = self.slot(key);
            let mut cached = slot.lock().await;
            let entry = self.ensure_loaded(key, &mut cached).await.and_then(|row| {
                row.entry(index)
                    .cloned()
                    .ok_or_else(|| DbError::unknown_column(&self.inner.name, column))
            });
            entry
        };

        if entry.is_err() {
            self.prune(key);
        }
        entry
    }

    /// Change one column of the cached row for `key`.
    ///
    /// The key's lock is taken before this returns, so a later `get` of the
    /// key always sees the new value. A cached row is changed in place and the
    /// returned handle is already complete. Otherwise the handle belongs to a
    /// task that loads the row and then applies the change; it may be dropped.
    pub async fn set(
        &self,
        key: &str,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<DispatchHandle<()>> {
        let index = self.column_index(column)?;
        let value = value.into();
        let mut cached = self.slot(key).lock_owned().await;

        if let Some(row) = cached.as_mut().filter(|row| row.is_fresh(self.inner.ttl)) {
            row.set(index, value);
            Counters::bump(&self.inner.counters.hits);
            return Ok(DispatchHandle::ready(Ok(())));
        }

        let table = self.clone();
        let key = key.to_string();
        Ok(DispatchHandle::spawn(async move {
            let outcome = match table.ensure_loaded(&key, &mut *cached).await {
                Ok(row) => {
                    row.set(index, value);
                    Ok(())
                }
                Err(err) => {
                    warn!(table = %table.inner.name, key = %key, error = %err, "deferred set failed");
                    Err(err)
                }
            };
            drop(cached);
            if outcome.is_err() {
                table.prune(&key);
            }
            outcome
        }))
    }

    /// Flush the cached row for `key` with one upsert over every column.
    ///
    /// Fails with `NotCached` and writes nothing when the key is not cached.
    /// The key stays locked until the write is acknowledged; it is evicted on
    /// success and kept (still dirty) on failure.
    pub async fn update(&self, key: &str) -> Result<DispatchHandle<u64>> {
        let source = self.source()?;
        let mut cached = self.slot(key).lock_owned().await;

        let values = cached
            .as_ref()
            .filter(|row| row.is_fresh(self.inner.ttl))
            .map(CachedRow::values);
        let Some(values) = values else {
            if cached.take().is_some() {
                debug!(table = %self.inner.name, key, "cached row expired");
                Counters::bump(&self.inner.counters.evictions);
            }
            drop(cached);
            self.prune(key);
            return Err(DbError::not_cached(&self.inner.name, key));
        };

        let names: Vec<&str> = self.inner.columns.iter().map(|c| c.name()).collect();
        let (sql, repeats) = self
            .dialect()
            .upsert(&self.inner.name, &self.inner.identifier, &names);
        let mut params = Vec::with_capacity(values.len() * repeats);
        for _ in 0..repeats {
            params.extend(values.iter().cloned());
        }
        let flush = source.update(sql, params);

        let table = self.clone();
        let key = key.to_string();
        Ok(DispatchHandle::spawn(async move {
            let outcome = flush.await;
            let counters = &table.inner.counters;
            match &outcome {
                Ok(_) => {
                    *cached = None;
                    Counters::bump(&counters.flushes);
                    Counters::bump(&counters.evictions);
                    debug!(table = %table.inner.name, key = %key, "row flushed");
                }
                Err(err) => {
                    warn!(table = %table.inner.name, key = %key, error = %err, "flush failed, row stays cached");
                }
            }
            drop(cached);
            table.prune(&key);
            outcome
        }))
    }

    /// Delete the row for `key` and evict it once the delete is acknowledged.
    pub async fn delete(&self, key: &str) -> DispatchHandle<u64> {
        let source = match self.source() {
            Ok(source) => source,
            Err(err) => return DispatchHandle::ready(Err(err)),
        };
        let mut cached = self.slot(key).lock_owned().await;
        let sql = format!("DELETE FROM {} WHERE {}", self.inner.name, self.key_predicate());
        let removal = source.update(sql, vec![self.key_param(key)]);

        let table = self.clone();
        let key = key.to_string();
        DispatchHandle::spawn(async move {
            let outcome = removal.await;
            if outcome.is_ok() && cached.take().is_some() {
                Counters::bump(&table.inner.counters.evictions);
            }
            drop(cached);
            table.prune(&key);
            outcome
        })
    }

    /// Identifier values of every row whose `column` equals `value`.
    ///
    /// Scans the whole table in storage order and leaves the cache alone.
    pub async fn filter(&self, column: &str, value: impl Into<Value>) -> Result<Vec<Value>> {
        let index = self.column_index(column)?;
        let target = value.into();
        let inner = &self.inner;
        let column = &inner.columns[index];

        let scan = self
            .source()?
            .query(format!("SELECT * FROM {}", inner.name), Vec::new())
            .await?;

        Ok(scan
            .into_rows()
            .into_iter()
            .filter(|row| row.get(index).is_some_and(|v| column.value_matches(v, &target)))
            .filter_map(|mut row| {
                (inner.identifier_index < row.len())
                    .then(|| row.swap_remove(inner.identifier_index))
            })
            .collect())
    }

    /// Projection of this table filtered on one column.
    ///
    /// `table_name` must name this table.
    pub fn pselect(
        &self,
        columns: &[&str],
        table_name: &str,
        condition_column: &str,
        value: impl Into<Value>,
    ) -> Result<DispatchHandle<ResultSet>> {
        if table_name != self.inner.name {
            return Err(DbError::invalid_argument(format!(
                "pselect on table '{}' cannot read table '{table_name}'",
                self.inner.name
            )));
        }
        Ok(self
            .select()?
            .columns(columns.iter().copied())
            .where_eq(condition_column, value)
            .execute())
    }

    pub fn select(&self) -> Result<SelectBuilder> {
        Ok(SelectBuilder::new(self.source()?, &self.inner.name))
    }

    pub fn update_builder(&self) -> Result<UpdateBuilder> {
        Ok(UpdateBuilder::new(self.source()?, &self.inner.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_name() {
        assert!(check_name("table", "users").is_ok());
        assert!(check_name("table", "user_2024").is_ok());
        assert!(check_name("table", "").is_err());
        assert!(check_name("table", "users; DROP TABLE x").is_err());
        assert!(matches!(
            check_name("identifier", "user-id"),
            Err(DbError::InvalidArgument { .. })
        ));
    }
}
