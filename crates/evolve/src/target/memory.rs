use super::{AppliedVersion, BoxFuture, MigrationTarget, TargetState};
use crate::version::Version;
use crate::{Error, Result};
use evolve_schema::{Schema, SchemaHash};
use std::collections::HashSet;
use std::future::ready;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
struct Snapshot {
    meta: bool,
    applied: Vec<AppliedVersion>,
    statements: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    committed: Snapshot,
    /// Working copy while a transaction is open.
    pending: Option<Snapshot>,
    executed: Vec<String>,
    fail_on: Option<String>,
    introspected: Option<SchemaHash>,
}

/// An in-process target.
///
/// Statements are recorded, not run. Transactions keep a pending copy of the
/// state that replaces the committed one on commit and is dropped on
/// rollback, so a failed version leaves no trace.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    inner: Mutex<Inner>,
    locks: Arc<Mutex<HashSet<String>>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// A target that already has `versions` applied.
    pub fn with_applied(versions: &[Version]) -> Self {
        let target = Self::new();
        if let Ok(mut inner) = target.inner.lock() {
            inner.committed.meta = true;
            inner.committed.applied = versions
                .iter()
                .map(|v| AppliedVersion {
                    version: v.version.clone(),
                    post_hash: v.post_hash.clone(),
                    applied_at: jiff::Timestamp::now(),
                })
                .collect();
        }
        target
    }

    /// A second handle on the same database: shares the lock table only.
    pub fn sharing_locks(other: &MemoryTarget) -> Self {
        Self {
            inner: Mutex::default(),
            locks: Arc::clone(&other.locks),
        }
    }

    /// Make any statement containing `needle` fail.
    pub fn fail_on(&self, needle: impl Into<String>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_on = Some(needle.into());
        }
    }

    /// Pretend introspection of the live schema yields `hash`.
    pub fn set_introspected_hash(&self, hash: SchemaHash) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.introspected = Some(hash);
        }
    }

    /// Every statement that ran, including rolled-back ones.
    pub fn executed_statements(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.executed.clone())
            .unwrap_or_default()
    }

    /// Statements whose transaction committed.
    pub fn committed_statements(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.committed.statements.clone())
            .unwrap_or_default()
    }

    pub fn in_transaction(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.pending.is_some())
            .unwrap_or(false)
    }

    pub fn is_locked(&self, lock: &str) -> bool {
        self.locks
            .lock()
            .map(|locks| locks.contains(lock))
            .unwrap_or(false)
    }

    fn inner(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Target("memory target state is poisoned".to_string()))
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T>) -> Result<T> {
        let mut inner = self.inner()?;
        f(&mut inner)
    }

    fn try_lock_sync(&self, lock: &str) -> Result<bool> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::Target("lock table is poisoned".to_string()))?;
        Ok(locks.insert(lock.to_string()))
    }

    fn unlock_sync(&self, lock: &str) -> Result<()> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::Target("lock table is poisoned".to_string()))?;
        locks.remove(lock);
        Ok(())
    }
}

fn no_transaction() -> Error {
    Error::Target("no transaction is open".to_string())
}

impl MigrationTarget for MemoryTarget {
    fn try_lock<'a>(&'a self, lock: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(ready(self.try_lock_sync(lock)))
    }

    fn unlock<'a>(&'a self, lock: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(ready(self.unlock_sync(lock)))
    }

    fn ensure_meta(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(ready(self.with_inner(|inner| {
            inner.committed.meta = true;
            Ok(())
        })))
    }

    fn state(&self) -> BoxFuture<'_, Result<TargetState>> {
        Box::pin(ready(self.with_inner(|inner| {
            if !inner.committed.meta {
                return Err(Error::Target("bookkeeping storage does not exist".to_string()));
            }
            let applied = inner.committed.applied.clone();
            let last = applied.last();
            Ok(TargetState {
                cursor: last.map(|a| a.version.clone()),
                hash: last
                    .map(|a| a.post_hash.clone())
                    .unwrap_or_else(|| Schema::default().content_hash()),
                applied,
            })
        })))
    }

    fn begin(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(ready(self.with_inner(|inner| {
            if inner.pending.is_some() {
                return Err(Error::Target("a transaction is already open".to_string()));
            }
            inner.pending = Some(inner.committed.clone());
            Ok(())
        })))
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(ready(self.with_inner(|inner| {
            if let Some(needle) = &inner.fail_on {
                if sql.contains(needle.as_str()) {
                    return Err(Error::Target(format!("injected failure on: {}", sql)));
                }
            }
            let pending = inner.pending.as_mut().ok_or_else(no_transaction)?;
            pending.statements.push(sql.to_string());
            inner.executed.push(sql.to_string());
            Ok(())
        })))
    }

    fn record_applied<'a>(&'a self, version: &'a Version) -> BoxFuture<'a, Result<()>> {
        Box::pin(ready(self.with_inner(|inner| {
            let pending = inner.pending.as_mut().ok_or_else(no_transaction)?;
            pending.applied.push(AppliedVersion {
                version: version.version.clone(),
                post_hash: version.post_hash.clone(),
                applied_at: jiff::Timestamp::now(),
            });
            Ok(())
        })))
    }

    fn commit(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(ready(self.with_inner(|inner| {
            let pending = inner.pending.take().ok_or_else(no_transaction)?;
            inner.committed = pending;
            Ok(())
        })))
    }

    fn rollback(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(ready(self.with_inner(|inner| {
            inner.pending.take().ok_or_else(no_transaction)?;
            Ok(())
        })))
    }

    fn introspect_hash(&self) -> BoxFuture<'_, Result<Option<SchemaHash>>> {
        Box::pin(ready(self.with_inner(|inner| Ok(inner.introspected.clone()))))
    }
}
