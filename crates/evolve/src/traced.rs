//! Traced database connections.
//!
//! Every statement a [`PgTarget`](crate::PgTarget) sends goes through
//! [`TracedConn`], which wraps it in a `db.*` debug span carrying the SQL and
//! what came back.

use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Error, Row};
use tracing::Instrument;

/// Something that can hand out a Postgres client for one session.
///
/// Implemented for `tokio_postgres::Client` and `deadpool_postgres::Object`.
pub trait Connection: Send + Sync {
    fn client(&self) -> &Client;
}

impl Connection for Client {
    fn client(&self) -> &Client {
        self
    }
}

impl Connection for deadpool_postgres::Object {
    fn client(&self) -> &Client {
        self
    }
}

/// Extension trait to get a traced wrapper from a connection.
pub trait ConnectionExt: Connection + Sized {
    fn traced(&self) -> TracedConn<'_> {
        TracedConn::new(self.client())
    }
}

impl<C: Connection> ConnectionExt for C {}

/// A client borrowed for a few statements, logging each one.
///
/// ```ignore
/// use evolve::ConnectionExt;
///
/// let conn = pool.get().await?;
/// conn.traced().batch_execute("BEGIN").await?;
/// ```
#[derive(Clone, Copy)]
pub struct TracedConn<'a> {
    client: &'a Client,
}

impl<'a> TracedConn<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Execute a statement, returning the number of rows affected.
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64, Error> {
        let span = tracing::debug_span!(
            "db.execute",
            sql = %sql,
            params = params.len(),
            affected = tracing::field::Empty,
        );
        let affected = self
            .client
            .execute(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("affected", affected);
        Ok(affected)
    }

    /// Run parameterless statements: DDL and transaction control.
    pub async fn batch_execute(&self, sql: &str) -> Result<(), Error> {
        let span = tracing::debug_span!("db.batch_execute", sql = %sql);
        let result = self.client.batch_execute(sql).instrument(span.clone()).await;
        if let Err(e) = &result {
            span.in_scope(|| tracing::debug!(code = ?e.code(), "statement failed"));
        }
        result
    }

    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let rows = self
            .client
            .query(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    /// Execute a query that must return exactly one row.
    pub async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row, Error> {
        let span = tracing::debug_span!("db.query_one", sql = %sql, params = params.len());
        self.client.query_one(sql, params).instrument(span).await
    }
}
