//! Runner against a real Postgres.
//!
//! Needs Docker; run with `cargo test -p evolve --features test-postgres`.

#![cfg(feature = "test-postgres")]

use evolve::meta::VERSION_TABLE;
use evolve::{Error, MigrationConflictError, PgTarget, Runner, Version, VersionId, lock_key};
use evolve_schema::{Column, ColumnType, EntityBuilder, OnDelete, RelationBuilder, Schema, SchemaBuilder};
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio_postgres::{Client, NoTls};

const LOCK: &str = "evolve";

struct Db {
    _container: ContainerAsync<Postgres>,
    url: String,
}

impl Db {
    async fn start() -> Self {
        let container = Postgres::default().start().await.unwrap();
        let host = container.get_host().await.unwrap();
        let port = container.get_host_port_ipv4(5432).await.unwrap();
        let url = format!("host={host} port={port} user=postgres password=postgres dbname=postgres");
        Self {
            _container: container,
            url,
        }
    }

    async fn connect(&self) -> Client {
        let (client, connection) = tokio_postgres::connect(&self.url, NoTls).await.unwrap();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                eprintln!("connection error: {}", e);
            }
        });
        client
    }
}

fn posts() -> Schema {
    SchemaBuilder::new()
        .entity(EntityBuilder::new("Post").column(Column::new("title", ColumnType::String)))
        .build()
        .unwrap()
}

fn comments() -> Schema {
    SchemaBuilder::new()
        .entity(EntityBuilder::new("Post").column(Column::new("title", ColumnType::String)))
        .entity(
            EntityBuilder::new("Comment")
                .column(Column::new("text", ColumnType::String))
                .relation(RelationBuilder::many_has_one("post", "Post").on_delete(OnDelete::Cascade)),
        )
        .build()
        .unwrap()
}

fn history() -> Vec<Version> {
    let v1 = Version::plan(VersionId::new("0001-posts").unwrap(), &Schema::default(), &posts())
        .unwrap();
    let v2 = Version::plan(VersionId::new("0002-comments").unwrap(), &posts(), &comments()).unwrap();
    vec![v1, v2]
}

async fn columns(client: &Client, table: &str) -> Vec<String> {
    client
        .query(
            "SELECT column_name FROM information_schema.columns WHERE table_name = $1 ORDER BY ordinal_position",
            &[&table],
        )
        .await
        .unwrap()
        .iter()
        .map(|row| row.get(0))
        .collect()
}

#[tokio::test]
async fn migrates_and_records() {
    let db = Db::start().await;
    let runner = Runner::new(PgTarget::new(db.connect().await), LOCK);

    let report = runner.run(&history()).await.unwrap();
    assert_eq!(report.applied.len(), 2);

    let client = runner.target().connection();
    assert_eq!(columns(client, "comment").await, vec!["id", "text", "post_id"]);
    let recorded: i64 = client
        .query_one(format!(r#"SELECT count(*) FROM "{}""#, VERSION_TABLE).as_str(), &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(recorded, 2);

    let again = runner.run(&history()).await.unwrap();
    assert!(again.applied.is_empty());
}

#[tokio::test]
async fn failed_version_leaves_no_trace() {
    let db = Db::start().await;
    let versions = history();
    let runner = Runner::new(PgTarget::new(db.connect().await), LOCK);
    runner.run(&versions[..1]).await.unwrap();

    // A NOT NULL column without a default cannot be added to a table with rows.
    let client = runner.target().connection();
    client
        .execute(r#"INSERT INTO "post" (id, title) VALUES (gen_random_uuid(), 'hello')"#, &[])
        .await
        .unwrap();
    let strict = SchemaBuilder::new()
        .entity(
            EntityBuilder::new("Post")
                .column(Column::new("title", ColumnType::String))
                .column(Column::new("body", ColumnType::String).not_null()),
        )
        .build()
        .unwrap();
    let mut broken = versions[..1].to_vec();
    broken.push(Version::plan(VersionId::new("0002-body").unwrap(), &posts(), &strict).unwrap());

    let failure = runner.run(&broken).await.unwrap_err();
    assert!(matches!(failure.error, Error::Postgres(_)));
    assert_eq!(failure.modification_index, Some(0));
    assert_eq!(columns(client, "post").await, vec!["id", "title"]);

    let recorded: i64 = client
        .query_one(format!(r#"SELECT count(*) FROM "{}""#, VERSION_TABLE).as_str(), &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(recorded, 1);
}

#[tokio::test]
async fn held_lock_is_reported() {
    let db = Db::start().await;
    let holder = db.connect().await;
    holder
        .execute("SELECT pg_advisory_lock($1)", &[&lock_key(LOCK)])
        .await
        .unwrap();

    let runner = Runner::new(PgTarget::new(db.connect().await), LOCK);
    let failure = runner.run(&history()).await.unwrap_err();
    assert!(matches!(
        failure.error,
        Error::MigrationConflict(MigrationConflictError::LockHeld { .. })
    ));
}
