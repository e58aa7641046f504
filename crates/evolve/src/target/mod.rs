//! Databases the runner can migrate.
//!
//! The runner drives a [`MigrationTarget`] through a fixed protocol: lock,
//! read state, then one transaction per version. [`PgTarget`] speaks it to
//! Postgres; [`MemoryTarget`] keeps everything in process for dry runs and
//! tests.

use crate::version::{Version, VersionId};
use crate::Result;
use evolve_schema::SchemaHash;

mod memory;
mod postgres;

pub use memory::MemoryTarget;
pub use postgres::PgTarget;

pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// A version the target has recorded as applied.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedVersion {
    pub version: VersionId,
    pub post_hash: SchemaHash,
    pub applied_at: jiff::Timestamp,
}

/// What the target says about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetState {
    /// Last applied version, `None` for a fresh target.
    pub cursor: Option<VersionId>,
    /// Schema hash recorded with the cursor (the empty schema's hash if none).
    pub hash: SchemaHash,
    /// Applied versions, oldest first.
    pub applied: Vec<AppliedVersion>,
}

/// A database migrations are applied to.
pub trait MigrationTarget: Send + Sync {
    /// Take the session-wide advisory lock. Returns `false` if someone else
    /// holds it; never waits.
    fn try_lock<'a>(&'a self, lock: &'a str) -> BoxFuture<'a, Result<bool>>;

    fn unlock<'a>(&'a self, lock: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Create the bookkeeping storage if it does not exist yet.
    fn ensure_meta(&self) -> BoxFuture<'_, Result<()>>;

    fn state(&self) -> BoxFuture<'_, Result<TargetState>>;

    fn begin(&self) -> BoxFuture<'_, Result<()>>;

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Record `version` as applied, inside the open transaction.
    fn record_applied<'a>(&'a self, version: &'a Version) -> BoxFuture<'a, Result<()>>;

    fn commit(&self) -> BoxFuture<'_, Result<()>>;

    fn rollback(&self) -> BoxFuture<'_, Result<()>>;

    /// Hash of the live physical schema, if the target can introspect it.
    ///
    /// Only used to warn about drift.
    fn introspect_hash(&self) -> BoxFuture<'_, Result<Option<SchemaHash>>> {
        Box::pin(async { Ok(None) })
    }
}

/// Advisory lock key for a lock name: the first 8 bytes of its blake3 hash.
pub fn lock_key(lock: &str) -> i64 {
    let hash = blake3::hash(lock.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    i64::from_be_bytes(bytes)
}
