//! Applying versions to a target.

use crate::error::{MigrationConflictError, ProgrammingError};
use crate::target::MigrationTarget;
use crate::version::{Version, VersionId, reconstruct};
use crate::Error;
use evolve_schema::Schema;
use evolve_sql::DdlBuilder;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Instrument, error, info, info_span, warn};

/// Set to stop the runner before its next version.
///
/// A version whose transaction has begun always finishes or rolls back first.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A successful run.
#[derive(Debug)]
pub struct RunReport {
    /// Versions applied by this run, in order.
    pub applied: Vec<VersionId>,
    /// Whether the run stopped early because of the cancel flag.
    pub cancelled: bool,
    /// The schema the target is now at.
    pub schema: Schema,
}

/// A run that stopped on an error.
#[derive(Debug, thiserror::Error)]
#[error("{}", describe_failure(.version.as_ref(), .modification_index, .error))]
pub struct RunFailure {
    /// The version being applied, if the failure happened inside one.
    pub version: Option<VersionId>,
    /// The modification that failed, if one did.
    pub modification_index: Option<usize>,
    /// Versions committed before the failure.
    pub applied: Vec<VersionId>,
    #[source]
    pub error: Error,
}

fn describe_failure(version: Option<&VersionId>, index: &Option<usize>, error: &Error) -> String {
    match (version, index) {
        (Some(v), Some(i)) => format!("version {}, modification #{}: {}", v, i, error),
        (Some(v), None) => format!("version {}: {}", v, error),
        (None, _) => error.to_string(),
    }
}

pub type RunResult = std::result::Result<RunReport, RunFailure>;

/// Applies pending versions to one target, one transaction per version.
pub struct Runner<T: MigrationTarget> {
    target: T,
    lock_name: String,
    cancel: CancelFlag,
}

impl<T: MigrationTarget> Runner<T> {
    pub fn new(target: T, lock_name: impl Into<String>) -> Self {
        Self {
            target,
            lock_name: lock_name.into(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Apply every version of `versions` the target has not seen yet.
    ///
    /// `versions` is the whole history, oldest first. The advisory lock is
    /// held for the whole run and released on every path.
    pub async fn run(&self, versions: &[Version]) -> RunResult {
        let locked = self.target.try_lock(&self.lock_name).await.map_err(|error| RunFailure {
            version: None,
            modification_index: None,
            applied: Vec::new(),
            error,
        })?;
        if !locked {
            warn!(lock = %self.lock_name, "migration lock is held by another session");
            return Err(RunFailure {
                version: None,
                modification_index: None,
                applied: Vec::new(),
                error: MigrationConflictError::LockHeld {
                    lock: self.lock_name.clone(),
                }
                .into(),
            });
        }
        info!(lock = %self.lock_name, "acquired migration lock");

        let mut applied = Vec::new();
        let result = self.run_locked(versions, &mut applied).await;

        if let Err(e) = self.target.unlock(&self.lock_name).await {
            warn!(lock = %self.lock_name, "failed to release migration lock: {}", e);
        } else {
            info!(lock = %self.lock_name, "released migration lock");
        }

        match result {
            Ok((schema, cancelled)) => Ok(RunReport {
                applied,
                cancelled,
                schema,
            }),
            Err((version, modification_index, error)) => Err(RunFailure {
                version,
                modification_index,
                applied,
                error,
            }),
        }
    }

    async fn run_locked(
        &self,
        versions: &[Version],
        applied: &mut Vec<VersionId>,
    ) -> std::result::Result<(Schema, bool), RunError> {
        self.target.ensure_meta().await.map_err(before_versions)?;
        let state = self.target.state().await.map_err(before_versions)?;

        let done = match &state.cursor {
            None => 0,
            Some(cursor) => {
                let position = versions
                    .iter()
                    .position(|v| &v.version == cursor)
                    .ok_or_else(|| {
                        before_versions(
                            MigrationConflictError::UnknownCursor {
                                cursor: cursor.clone(),
                            }
                            .into(),
                        )
                    })?;
                position + 1
            }
        };

        let mut schema = reconstruct(&versions[..done]).map_err(before_versions)?;
        if let Some(cursor) = &state.cursor {
            let replayed = schema.content_hash();
            if replayed != state.hash {
                return Err(before_versions(
                    MigrationConflictError::HashMismatch {
                        version: cursor.clone(),
                        expected: replayed,
                        actual: state.hash,
                    }
                    .into(),
                ));
            }
        }

        match self.target.introspect_hash().await {
            Ok(Some(live)) if live != state.hash => {
                warn!(recorded = %state.hash, live = %live, "live schema drifted from the recorded hash");
            }
            Ok(_) => {}
            Err(e) => warn!("could not introspect the live schema: {}", e),
        }

        let pending = &versions[done..];
        info!(pending = pending.len(), "{} version(s) to apply", pending.len());

        for version in pending {
            if self.cancel.is_cancelled() {
                info!("cancelled before version {}", version.version);
                return Ok((schema, true));
            }
            let span = info_span!("migration", version = %version.version);
            schema = self
                .apply_version(&schema, version)
                .instrument(span)
                .await
                .map_err(|(index, error)| (Some(version.version.clone()), index, error))?;
            applied.push(version.version.clone());
        }
        Ok((schema, false))
    }

    /// One version, one transaction.
    async fn apply_version(
        &self,
        schema: &Schema,
        version: &Version,
    ) -> std::result::Result<Schema, VersionError> {
        let actual = schema.content_hash();
        if actual != version.pre_hash {
            error!(expected = %version.pre_hash, actual = %actual, "pre-hash mismatch, nothing executed");
            return Err((
                None,
                MigrationConflictError::HashMismatch {
                    version: version.version.clone(),
                    expected: version.pre_hash.clone(),
                    actual,
                }
                .into(),
            ));
        }

        self.target.begin().await.map_err(whole_version)?;
        match self.apply_in_transaction(schema, version).await {
            Ok(next) => {
                self.target.commit().await.map_err(whole_version)?;
                info!(modifications = version.modifications.len(), "applied");
                Ok(next)
            }
            Err((index, e)) => {
                match index {
                    Some(index) => error!(index, "modification failed, rolling back: {}", e),
                    None => error!("version failed, rolling back: {}", e),
                }
                if let Err(rollback) = self.target.rollback().await {
                    error!("rollback failed: {}", rollback);
                }
                Err((index, e))
            }
        }
    }

    async fn apply_in_transaction(
        &self,
        schema: &Schema,
        version: &Version,
    ) -> std::result::Result<Schema, VersionError> {
        let mut current = schema.clone();
        for (index, modification) in version.modifications.iter().enumerate() {
            let at = |e: Error| (Some(index), e);
            let mut ddl = DdlBuilder::new();
            modification
                .apply_to_database(&current, &mut ddl)
                .map_err(|e| at(e.into()))?;
            for stmt in ddl.statements() {
                self.target.execute(stmt).await.map_err(at)?;
            }
            current = modification
                .apply_to_schema(&current)
                .map_err(|e| at(e.into()))?;
        }

        let actual = current.content_hash();
        if actual != version.post_hash {
            return Err((
                None,
                ProgrammingError {
                    version: version.version.clone(),
                    expected: version.post_hash.clone(),
                    actual,
                }
                .into(),
            ));
        }
        self.target
            .record_applied(version)
            .await
            .map_err(whole_version)?;
        Ok(current)
    }
}

/// A failure before any version started.
type RunError = (Option<VersionId>, Option<usize>, Error);

/// A failure inside one version, with the modification index if one failed.
type VersionError = (Option<usize>, Error);

fn before_versions(error: Error) -> RunError {
    (None, None, error)
}

fn whole_version(error: Error) -> VersionError {
    (None, error)
}
