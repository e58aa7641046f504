//! Declarative schema migrations for Postgres.
//!
//! You describe the schema you want as an [`evolve_schema::Schema`] value.
//! evolve diffs it against the schema the history ends at, and records the
//! difference as a [`Version`]: an ordered list of [`Modification`]s plus the
//! content hashes of the schema before and after.
//!
//! ```text
//! desired schema ──diff──▶ modifications ──plan──▶ Version ──append──▶ VersionStore
//!                                                                         │
//!                              MigrationTarget ◀──── Runner ◀─────────────┘
//! ```
//!
//! # Modifications
//!
//! Every modification is interpreted twice: as a pure transform of the schema
//! value ([`Modification::apply_to_schema`]) and as Postgres DDL
//! ([`Modification::apply_to_database`]). Replaying the history from the
//! empty schema therefore reconstructs the schema any version ends at,
//! without looking at a database.
//!
//! # Running
//!
//! The [`Runner`] takes the migration advisory lock, checks that the target's
//! recorded hash matches the replayed history, and applies each pending
//! version in its own transaction:
//!
//! ```ignore
//! let store = DirVersionStore::open("migrations")?;
//! let runner = Runner::new(PgTarget::new(client), "evolve");
//! let report = runner.run(&store.versions()?).await?;
//! ```
//!
//! A version that fails rolls back entirely; versions committed before it
//! stay committed.

pub mod diff;
mod error;
pub mod meta;
pub mod modification;
pub mod runner;
pub mod solver;
pub mod store;
pub mod target;
mod traced;
pub mod version;

pub use diff::{FieldRename, RenameHints, diff, diff_with_hints};
pub use error::{
    Error, MigrationConflictError, ProgrammingError, UnknownModificationError,
};
pub use modification::{
    FoldError, Modification, ModificationApplicationError, Precondition, apply_modifications,
    to_ddl,
};
pub use runner::{CancelFlag, RunFailure, RunReport, RunResult, Runner};
pub use solver::{SolverError, plan_is_applicable};
pub use store::{DirVersionStore, MemoryVersionStore, VersionStore};
pub use target::{AppliedVersion, MemoryTarget, MigrationTarget, PgTarget, TargetState, lock_key};
pub use traced::{Connection, ConnectionExt, TracedConn};
pub use version::{FORMAT_VERSION, Version, VersionId, reconstruct};

pub use evolve_schema;
pub use evolve_sql;

pub type Result<T, E = Error> = std::result::Result<T, E>;
