//! Runner behaviour against the in-memory target.

use evolve::{
    CancelFlag, Error, MemoryTarget, MigrationConflictError, MigrationTarget, Runner, Version,
    VersionId,
};
use evolve_schema::{
    Column, ColumnType, EntityBuilder, OnDelete, RelationBuilder, Schema, SchemaBuilder, SchemaHash,
};

const LOCK: &str = "evolve";

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

fn ids(versions: &[VersionId]) -> Vec<&str> {
    versions.iter().map(VersionId::as_str).collect()
}

#[tokio::test]
async fn fresh_target_gets_every_version() {
    let runner = Runner::new(MemoryTarget::new(), LOCK);
    let report = runner.run(&history()).await.unwrap();

    assert_eq!(ids(&report.applied), vec!["0001-posts", "0002-comments"]);
    assert!(!report.cancelled);
    assert_eq!(report.schema, comments());

    let target = runner.target();
    assert!(!target.is_locked(LOCK));
    assert!(!target.in_transaction());
    let state = target.state().await.unwrap();
    assert_eq!(state.cursor.as_ref().map(VersionId::as_str), Some("0002-comments"));
    assert_eq!(state.hash, comments().content_hash());
    assert!(
        target
            .committed_statements()
            .iter()
            .any(|s| s.starts_with("CREATE TABLE \"comment\""))
    );
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let runner = Runner::new(MemoryTarget::new(), LOCK);
    runner.run(&history()).await.unwrap();
    let before = runner.target().executed_statements().len();

    let report = runner.run(&history()).await.unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.schema, comments());
    assert_eq!(runner.target().executed_statements().len(), before);
}

#[tokio::test]
async fn picks_up_after_the_cursor() {
    let versions = history();
    let runner = Runner::new(MemoryTarget::with_applied(&versions[..1]), LOCK);
    let report = runner.run(&versions).await.unwrap();
    assert_eq!(ids(&report.applied), vec!["0002-comments"]);
    assert!(
        runner
            .target()
            .executed_statements()
            .iter()
            .all(|s| !s.starts_with("CREATE TABLE \"post\""))
    );
}

#[tokio::test]
async fn failing_version_rolls_back_alone() {
    let target = MemoryTarget::new();
    target.fail_on("\"comment\"");
    let runner = Runner::new(target, LOCK);

    let failure = runner.run(&history()).await.unwrap_err();
    assert_eq!(ids(&failure.applied), vec!["0001-posts"]);
    assert_eq!(failure.version.as_ref().map(VersionId::as_str), Some("0002-comments"));
    assert_eq!(failure.modification_index, Some(0));
    assert!(matches!(failure.error, Error::Target(_)));
    assert!(failure.to_string().contains("modification #0"), "{}", failure);

    let target = runner.target();
    assert!(!target.in_transaction());
    assert!(!target.is_locked(LOCK));
    let state = target.state().await.unwrap();
    assert_eq!(state.cursor.as_ref().map(VersionId::as_str), Some("0001-posts"));
    assert!(
        target
            .committed_statements()
            .iter()
            .all(|s| !s.contains("comment"))
    );
}

#[tokio::test]
async fn held_lock_stops_the_run() {
    let other = MemoryTarget::new();
    assert!(other.try_lock(LOCK).await.unwrap());

    let runner = Runner::new(MemoryTarget::sharing_locks(&other), LOCK);
    let failure = runner.run(&history()).await.unwrap_err();
    assert!(matches!(
        failure.error,
        Error::MigrationConflict(MigrationConflictError::LockHeld { .. })
    ));
    assert!(runner.target().executed_statements().is_empty());
    // The other session still owns it.
    assert!(other.is_locked(LOCK));

    other.unlock(LOCK).await.unwrap();
    runner.run(&history()).await.unwrap();
}

#[tokio::test]
async fn recorded_hash_mismatch_is_a_conflict() {
    let versions = history();
    let mut forged = versions[0].clone();
    forged.post_hash = SchemaHash("not-what-we-expect".to_string());

    let runner = Runner::new(MemoryTarget::with_applied(&[forged]), LOCK);
    let failure = runner.run(&versions).await.unwrap_err();
    match &failure.error {
        Error::MigrationConflict(MigrationConflictError::HashMismatch { version, .. }) => {
            assert_eq!(version.as_str(), "0001-posts");
        }
        other => panic!("expected a hash mismatch, got {:?}", other),
    }
    assert!(runner.target().executed_statements().is_empty());
    assert!(!runner.target().is_locked(LOCK));
}

#[tokio::test]
async fn unknown_cursor_is_a_conflict() {
    let stranger = Version::plan(
        VersionId::new("9999-elsewhere").unwrap(),
        &Schema::default(),
        &posts(),
    )
    .unwrap();
    let runner = Runner::new(MemoryTarget::with_applied(&[stranger]), LOCK);
    let failure = runner.run(&history()).await.unwrap_err();
    assert!(matches!(
        failure.error,
        Error::MigrationConflict(MigrationConflictError::UnknownCursor { .. })
    ));
    assert!(runner.target().executed_statements().is_empty());
}

#[tokio::test]
async fn wrong_post_hash_is_a_programming_error() {
    let mut versions = history();
    versions[1].post_hash = SchemaHash("bogus".to_string());

    let runner = Runner::new(MemoryTarget::new(), LOCK);
    let failure = runner.run(&versions).await.unwrap_err();
    assert!(matches!(failure.error, Error::Programming(_)));
    assert_eq!(failure.modification_index, None);
    assert_eq!(ids(&failure.applied), vec!["0001-posts"]);

    // The statements ran, then the transaction was rolled back.
    let target = runner.target();
    assert!(target.executed_statements().iter().any(|s| s.contains("\"comment\"")));
    assert!(target.committed_statements().iter().all(|s| !s.contains("\"comment\"")));
}

#[tokio::test]
async fn cancel_stops_between_versions() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let runner = Runner::new(MemoryTarget::new(), LOCK).with_cancel(cancel);
    let report = runner.run(&history()).await.unwrap();
    assert!(report.cancelled);
    assert!(report.applied.is_empty());
    assert_eq!(report.schema, Schema::default());
    assert!(!runner.target().is_locked(LOCK));
}

#[tokio::test]
async fn drift_only_warns() {
    let target = MemoryTarget::new();
    target.set_introspected_hash(SchemaHash("drifted".to_string()));
    let runner = Runner::new(target, LOCK);
    let report = runner.run(&history()).await.unwrap();
    assert_eq!(report.applied.len(), 2);
}
