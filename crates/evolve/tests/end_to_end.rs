//! Diff, plan, persist and replay one realistic schema change.

use evolve::{
    DirVersionStore, Modification, Version, VersionId, VersionStore, apply_modifications, diff,
    reconstruct, to_ddl,
};
use evolve_schema::{
    Column, ColumnType, EntityBuilder, OnDelete, RelationBuilder, Schema, SchemaBuilder,
};

fn posts() -> Schema {
    SchemaBuilder::new()
        .entity(EntityBuilder::new("Post").column(Column::new("title", ColumnType::String)))
        .build()
        .unwrap()
}

fn posts_with_comments() -> Schema {
    SchemaBuilder::new()
        .entity(EntityBuilder::new("Post").column(Column::new("title", ColumnType::String)))
        .entity(
            EntityBuilder::new("Comment")
                .column(Column::new("text", ColumnType::String))
                .column(Column::new("author", ColumnType::String))
                .relation(RelationBuilder::many_has_one("post", "Post").on_delete(OnDelete::Cascade))
                .named_unique("comment_post_author_key", ["post", "author"]),
        )
        .build()
        .unwrap()
}

#[test]
fn comment_diff_has_the_expected_shape() {
    let (old, new) = (posts(), posts_with_comments());
    let plan = diff(&old, &new);

    let kinds: Vec<_> = plan.iter().map(|m| m.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "createEntity",
            "addField",
            "addField",
            "addRelation",
            "addUniqueConstraint"
        ]
    );

    match &plan[0] {
        Modification::CreateEntity { entity } => {
            assert_eq!(entity.name, "Comment");
            assert_eq!(entity.fields.len(), 1);
        }
        other => panic!("unexpected {}", other),
    }
    match &plan[3] {
        Modification::AddRelation {
            entity_name,
            relation,
        } => {
            assert_eq!(entity_name, "Comment");
            assert_eq!(relation.target, "Post");
            assert_eq!(
                relation.join_column().map(|jc| jc.on_delete),
                Some(OnDelete::Cascade)
            );
        }
        other => panic!("unexpected {}", other),
    }
    match &plan[4] {
        Modification::AddUniqueConstraint { unique, .. } => {
            assert_eq!(unique.fields, vec!["post", "author"]);
        }
        other => panic!("unexpected {}", other),
    }

    assert_eq!(apply_modifications(&old, &plan).unwrap(), new);
}

#[test]
fn comment_diff_ddl() {
    let (old, new) = (posts(), posts_with_comments());
    let ddl = to_ddl(&old, &diff(&old, &new)).unwrap();
    insta::assert_snapshot!(ddl.to_sql(), @r#"
    CREATE TABLE "comment" (
        "id" uuid NOT NULL,
        PRIMARY KEY ("id")
    );
    ALTER TABLE "comment" ADD COLUMN "text" text;
    ALTER TABLE "comment" ADD COLUMN "author" text;
    ALTER TABLE "comment" ADD COLUMN "post_id" uuid;
    ALTER TABLE "comment" ADD CONSTRAINT "comment_post_id_fkey" FOREIGN KEY ("post_id") REFERENCES "post" ("id") ON DELETE CASCADE DEFERRABLE INITIALLY IMMEDIATE;
    ALTER TABLE "comment" ADD CONSTRAINT "comment_post_author_key" UNIQUE ("post_id", "author");
    "#);
}

#[test]
fn history_survives_a_round_trip_through_the_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = DirVersionStore::open(dir.path()).unwrap();

    let first = Version::plan(
        VersionId::new("2026-10-01-120000-posts").unwrap(),
        &Schema::default(),
        &posts(),
    )
    .unwrap();
    store.append(first).unwrap();

    let current = reconstruct(&store.versions().unwrap()).unwrap();
    assert_eq!(current, posts());

    let second = Version::plan(
        VersionId::new("2026-10-02-120000-comments").unwrap(),
        &current,
        &posts_with_comments(),
    )
    .unwrap();
    assert_eq!(second.pre_hash, posts().content_hash());
    store.append(second).unwrap();

    let reopened = DirVersionStore::open(dir.path()).unwrap();
    let history = reopened.versions().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(reconstruct(&history).unwrap(), posts_with_comments());
    assert_eq!(
        history[1].post_hash,
        posts_with_comments().content_hash()
    );
}

#[test]
fn removing_the_comments_again() {
    let (old, new) = (posts_with_comments(), posts());
    let plan = diff(&old, &new);
    let kinds: Vec<_> = plan.iter().map(|m| m.kind()).collect();
    assert_eq!(
        kinds,
        vec!["removeUniqueConstraint", "removeRelation", "removeEntity"]
    );
    assert_eq!(apply_modifications(&old, &plan).unwrap(), new);
}
