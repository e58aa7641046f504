use crate::modification::{FoldError, ModificationApplicationError};
use crate::version::VersionId;
use evolve_schema::{SchemaHash, SchemaValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    SchemaValidation(#[from] SchemaValidationError),

    #[error(transparent)]
    ModificationApplication(#[from] ModificationApplicationError),

    #[error(transparent)]
    MigrationConflict(#[from] MigrationConflictError),

    #[error(transparent)]
    UnknownModification(#[from] UnknownModificationError),

    #[error(transparent)]
    Programming(#[from] ProgrammingError),

    /// Replaying a stored version failed.
    #[error("version {version} does not replay: {source}")]
    Replay {
        version: VersionId,
        #[source]
        source: FoldError,
    },

    #[error("the two schemas are identical, nothing to plan")]
    EmptyPlan,

    #[error("invalid version id `{0}`: expected [0-9A-Za-z_-]+")]
    InvalidVersionId(String),

    #[error("version {version} uses format {format_version}, this build reads up to {supported}")]
    UnsupportedFormat {
        version: String,
        format_version: u32,
        supported: u32,
    },

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("version store: {0}")]
    Store(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(String),

    #[error("migration target: {0}")]
    Target(String),
}

/// The target is not in the state the versions expect.
///
/// Nothing was executed. Resolving this needs an operator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationConflictError {
    #[error("another session holds the migration lock `{lock}`")]
    LockHeld { lock: String },

    #[error("version {version} expects schema {expected}, but the target is at {actual}")]
    HashMismatch {
        version: VersionId,
        expected: SchemaHash,
        actual: SchemaHash,
    },

    #[error("the target's last applied version {cursor} is not in the version history")]
    UnknownCursor { cursor: VersionId },
}

/// The schema transform and the declared post-hash disagree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("version {version} declares post-hash {expected}, but its modifications produce {actual}")]
pub struct ProgrammingError {
    pub version: VersionId,
    pub expected: SchemaHash,
    pub actual: SchemaHash,
}

/// A stored modification kind this build does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("version {version}, modification #{index}: unknown kind `{kind}`")]
pub struct UnknownModificationError {
    pub version: String,
    pub index: usize,
    pub kind: String,
}
