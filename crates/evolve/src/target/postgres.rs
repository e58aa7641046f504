use super::{AppliedVersion, BoxFuture, MigrationTarget, TargetState, lock_key};
use crate::traced::{Connection, ConnectionExt};
use crate::version::{Version, VersionId};
use crate::{Result, meta};
use evolve_schema::{Schema, SchemaHash};

/// A Postgres database reached through a [`Connection`].
///
/// Advisory locks belong to the session, so the same connection must be used
/// for the whole run.
pub struct PgTarget<C: Connection> {
    conn: C,
}

impl<C: Connection> PgTarget<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    async fn read_state(&self) -> Result<TargetState> {
        let rows = self
            .conn
            .traced()
            .query(meta::applied_versions_sql(), &[])
            .await?;
        let mut applied = Vec::with_capacity(rows.len());
        for row in rows {
            let version: String = row.try_get("version")?;
            let post_hash: String = row.try_get("post_hash")?;
            let applied_at: jiff::Timestamp = row.try_get("applied_at")?;
            applied.push(AppliedVersion {
                version: VersionId::new(version)?,
                post_hash: SchemaHash(post_hash),
                applied_at,
            });
        }
        let last = applied.last();
        Ok(TargetState {
            cursor: last.map(|a| a.version.clone()),
            hash: last
                .map(|a| a.post_hash.clone())
                .unwrap_or_else(|| Schema::default().content_hash()),
            applied,
        })
    }

    async fn record(&self, version: &Version) -> Result<()> {
        let count = i32::try_from(version.modifications.len()).unwrap_or(i32::MAX);
        self.conn
            .traced()
            .execute(
                meta::record_version_sql(),
                &[
                    &version.version.as_str(),
                    &version.pre_hash.as_str(),
                    &version.post_hash.as_str(),
                    &count,
                ],
            )
            .await?;
        Ok(())
    }
}

impl<C: Connection> MigrationTarget for PgTarget<C> {
    fn try_lock<'a>(&'a self, lock: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let row = self
                .conn
                .traced()
                .query_one(meta::try_lock_sql(), &[&lock_key(lock)])
                .await?;
            Ok(row.try_get::<_, bool>(0)?)
        })
    }

    fn unlock<'a>(&'a self, lock: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.conn
                .traced()
                .query_one(meta::unlock_sql(), &[&lock_key(lock)])
                .await?;
            Ok(())
        })
    }

    fn ensure_meta(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.conn
                .traced()
                .batch_execute(meta::create_meta_table_sql())
                .await?;
            Ok(())
        })
    }

    fn state(&self) -> BoxFuture<'_, Result<TargetState>> {
        Box::pin(self.read_state())
    }

    fn begin(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(self.conn.traced().batch_execute("BEGIN").await?) })
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { Ok(self.conn.traced().batch_execute(sql).await?) })
    }

    fn record_applied<'a>(&'a self, version: &'a Version) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.record(version))
    }

    fn commit(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(self.conn.traced().batch_execute("COMMIT").await?) })
    }

    fn rollback(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(self.conn.traced().batch_execute("ROLLBACK").await?) })
    }
}
