//! SQL for the `_evolve_version` bookkeeping table.

// A macro rather than the const alone so `concat!` can splice the name into
// static SQL.
macro_rules! version_table {
    () => {
        "_evolve_version"
    };
}

/// Name of the table recording applied versions.
pub const VERSION_TABLE: &str = version_table!();

/// Create the bookkeeping table if it does not exist.
pub fn create_meta_table_sql() -> &'static str {
    concat!(
        r#"CREATE TABLE IF NOT EXISTS ""#,
        version_table!(),
        r#"" (
    version text PRIMARY KEY,
    pre_hash text NOT NULL,
    post_hash text NOT NULL,
    modification_count integer NOT NULL,
    applied_at timestamptz NOT NULL DEFAULT now()
)"#
    )
}

/// Applied versions, oldest first.
pub fn applied_versions_sql() -> &'static str {
    concat!(
        r#"SELECT version, post_hash, applied_at FROM ""#,
        version_table!(),
        r#"" ORDER BY version"#
    )
}

/// Record one applied version. Parameters: version, pre-hash, post-hash,
/// modification count.
pub fn record_version_sql() -> &'static str {
    concat!(
        r#"INSERT INTO ""#,
        version_table!(),
        r#"" (version, pre_hash, post_hash, modification_count) VALUES ($1, $2, $3, $4)"#
    )
}

pub fn try_lock_sql() -> &'static str {
    "SELECT pg_try_advisory_lock($1)"
}

pub fn unlock_sql() -> &'static str {
    "SELECT pg_advisory_unlock($1)"
}
