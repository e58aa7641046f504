use super::*;

fn blog() -> SchemaBuilder {
    SchemaBuilder::new()
        .enumeration(Enum::new("PostStatus", ["draft", "published"]))
        .entity(
            EntityBuilder::new("Post")
                .column(Column::new("title", ColumnType::String).not_null())
                .column(Column::new("status", ColumnType::Enum("PostStatus".into())))
                .relation(RelationBuilder::one_has_many("comments", "Comment", "post")),
        )
        .entity(
            EntityBuilder::new("Comment")
                .column(Column::new("text", ColumnType::String))
                .relation(RelationBuilder::many_has_one("post", "Post").on_delete(OnDelete::Cascade))
                .unique(["post", "text"]),
        )
}

fn violations(builder: SchemaBuilder) -> Vec<String> {
    match builder.build() {
        Ok(_) => panic!("expected the schema to be rejected"),
        Err(err) => err.violations.iter().map(|v| v.to_string()).collect(),
    }
}

#[test]
fn test_builder_defaults() {
    let schema = blog().build().unwrap();
    let comment = schema.entity("Comment").unwrap();

    assert_eq!(comment.table_name, "comment");
    assert_eq!(comment.primary, "id");
    let id = comment.primary_column().unwrap();
    assert_eq!(id.column_type, ColumnType::Uuid);
    assert!(!id.nullable);

    let post = comment.relation("post").unwrap();
    assert_eq!(post.kind, RelationKind::ManyHasOne);
    assert!(post.nullable);
    let jc = post.join_column().unwrap();
    assert_eq!(jc.column_name, "post_id");
    assert_eq!(jc.on_delete, OnDelete::Cascade);

    // The owning side learns about its inverse at build time.
    assert_eq!(post.inverse.as_deref(), Some("comments"));
    let unique = comment.unique.values().next().unwrap();
    assert!(unique.name.starts_with("unique_Comment_post_text_"));
}

#[test]
fn test_field_order_keeps_primary_first() {
    let schema = blog().build().unwrap();
    let names: Vec<&str> = schema.entities["Post"]
        .fields
        .keys()
        .map(|k| k.as_str())
        .collect();
    assert_eq!(names, ["id", "title", "status", "comments"]);
}

#[test]
fn test_many_has_many_junction_defaults() {
    let schema = SchemaBuilder::new()
        .entity(EntityBuilder::new("Tag"))
        .entity(
            EntityBuilder::new("BlogPost")
                .relation(RelationBuilder::many_has_many("tags", "Tag")),
        )
        .build()
        .unwrap();
    let tags = schema.entities["BlogPost"].relation("tags").unwrap();
    let jt = tags.join_table().unwrap();
    assert_eq!(jt.table_name, "blog_post_tags");
    assert_eq!(jt.join_column, "blog_post_id");
    assert_eq!(jt.inverse_join_column, "tag_id");
    assert_eq!(schema.entities["BlogPost"].storage_column("tags"), None);
}

#[test]
fn test_duplicate_declarations_are_violations() {
    let errs = violations(
        SchemaBuilder::new()
            .entity(EntityBuilder::new("Post"))
            .entity(
                EntityBuilder::new("Post").column(Column::new("title", ColumnType::String)),
            ),
    );
    assert_eq!(errs, ["entities.Post: entity declared twice"]);

    let errs = violations(
        SchemaBuilder::new().entity(
            EntityBuilder::new("Post")
                .column(Column::new("title", ColumnType::String))
                .column(Column::new("title", ColumnType::Int)),
        ),
    );
    assert_eq!(errs, ["entities.Post.fields.title: field declared twice"]);
}

#[test]
fn test_validation_reports_everything_at_once() {
    let errs = violations(
        SchemaBuilder::new().entity(
            EntityBuilder::new("Comment")
                .column(Column::new("kind", ColumnType::Enum("Missing".into())))
                .relation(
                    RelationBuilder::many_has_one("post", "Post")
                        .on_delete(OnDelete::SetNull)
                        .not_null(),
                )
                .unique(["nope"]),
        ),
    );
    assert_eq!(errs.len(), 4, "{:#?}", errs);
    assert!(errs.iter().any(|e| e.contains("unknown enum `Missing`")));
    assert!(errs.iter().any(|e| e.contains("target `Post` does not exist")));
    assert!(errs.iter().any(|e| e.contains("setNull requires a nullable relation")));
    assert!(errs.iter().any(|e| e.contains("field `nope` does not exist")));
}

#[test]
fn test_inverse_must_point_back() {
    let errs = violations(
        SchemaBuilder::new()
            .entity(EntityBuilder::new("Post").relation(RelationBuilder::one_has_many(
                "comments", "Comment", "author",
            )))
            .entity(
                EntityBuilder::new("Comment")
                    .relation(RelationBuilder::many_has_one("post", "Post")),
            ),
    );
    assert!(
        errs.iter()
            .any(|e| e.contains("inverse `Comment.author` does not exist")),
        "{:#?}",
        errs
    );
}

#[test]
fn test_inverse_kinds_must_be_complementary() {
    let errs = violations(
        SchemaBuilder::new()
            .entity(EntityBuilder::new("User").relation(RelationBuilder::one_has_one_inverse(
                "profile", "Profile", "user",
            )))
            .entity(
                EntityBuilder::new("Profile")
                    .relation(RelationBuilder::many_has_one("user", "User")),
            ),
    );
    assert!(
        errs.iter().any(|e| e.contains("expected oneHasOne")),
        "{:#?}",
        errs
    );
}

#[test]
fn test_unique_constraints_need_distinct_field_lists() {
    let errs = violations(
        SchemaBuilder::new().entity(
            EntityBuilder::new("User")
                .column(Column::new("email", ColumnType::String))
                .named_unique("users_email_a", ["email"])
                .named_unique("users_email_b", ["email"]),
        ),
    );
    assert_eq!(errs.len(), 1);
    assert!(errs[0].contains("another unique constraint covers (email)"));
}

#[test]
fn test_constraint_names_are_schema_wide() {
    let errs = violations(
        SchemaBuilder::new()
            .entity(
                EntityBuilder::new("A")
                    .column(Column::new("x", ColumnType::Int))
                    .named_index("shared", ["x"]),
            )
            .entity(
                EntityBuilder::new("B")
                    .column(Column::new("y", ColumnType::Int))
                    .named_unique("shared", ["y"]),
            ),
    );
    assert_eq!(errs.len(), 1, "{:#?}", errs);
    assert!(errs[0].contains("`shared` is already used"));
}

#[test]
fn test_enum_domains_cannot_collide() {
    let errs = violations(
        SchemaBuilder::new()
            .enumeration(Enum::new("Status", ["a"]))
            .enumeration(Enum::new("status", ["b"]))
            .entity(EntityBuilder::new("Post")),
    );
    assert_eq!(errs, ["enums.status: domain name `status` is already used at enums.Status"]);

    let errs = violations(
        SchemaBuilder::new()
            .enumeration(Enum::new("Post", ["a"]))
            .entity(EntityBuilder::new("Post")),
    );
    assert_eq!(errs.len(), 1, "{:#?}", errs);
    assert!(errs[0].contains("domain `post` clashes with the row type"), "{}", errs[0]);
}

#[test]
fn test_unique_names_cannot_take_foreign_key_names() {
    let errs = violations(
        SchemaBuilder::new()
            .entity(EntityBuilder::new("Post"))
            .entity(
                EntityBuilder::new("Comment")
                    .column(Column::new("text", ColumnType::String))
                    .relation(RelationBuilder::many_has_one("post", "Post"))
                    .named_unique("comment_post_id_fkey", ["text"]),
            ),
    );
    assert_eq!(errs.len(), 1, "{:#?}", errs);
    assert!(
        errs[0].contains("foreign key name `comment_post_id_fkey` is already used"),
        "{}",
        errs[0]
    );
}

#[test]
fn test_joining_columns_cannot_shadow_columns() {
    let errs = violations(
        SchemaBuilder::new()
            .entity(EntityBuilder::new("Post"))
            .entity(
                EntityBuilder::new("Comment")
                    .column(Column::new("post_id", ColumnType::Uuid))
                    .relation(RelationBuilder::many_has_one("post", "Post")),
            ),
    );
    assert_eq!(
        errs,
        ["entities.Comment.fields.post: column `post_id` is already used by field `post_id`"]
    );
}

#[test]
fn test_hash_ignores_map_order() {
    let a = blog().build().unwrap();
    let mut b = a.clone();
    b.entities.reverse();
    if let Some(post) = b.entities.get_mut("Post") {
        post.fields.reverse();
    }
    assert_eq!(a, b);
    assert_eq!(a.content_hash(), b.content_hash());
}

#[test]
fn test_hash_tracks_content() {
    let a = blog().build().unwrap();
    let mut b = a.clone();
    if let Some(Field::Column(title)) = b
        .entities
        .get_mut("Post")
        .and_then(|p| p.fields.get_mut("title"))
    {
        title.nullable = true;
    }
    assert_ne!(a, b);
    assert_ne!(a.content_hash(), b.content_hash());

    // Constraint field order is significant.
    let mut c = a.clone();
    if let Some(u) = c
        .entities
        .get_mut("Comment")
        .and_then(|e| e.unique.values_mut().next())
    {
        u.fields.reverse();
    }
    assert_ne!(a.content_hash(), c.content_hash());
}

#[test]
fn test_empty_schema_hash_is_stable() {
    assert_eq!(Schema::default().content_hash(), Schema::default().content_hash());
    assert_eq!(Schema::default().content_hash().as_str().len(), 64);
    assert_ne!(
        Schema::default().content_hash(),
        blog().build().unwrap().content_hash()
    );
}

#[test]
fn test_schema_json_roundtrip() {
    let schema = blog().build().unwrap();
    let json = facet_json::to_string(&schema).unwrap();
    assert!(json.contains("\"tableName\":\"comment\""), "{}", json);
    let back: Schema = facet_json::from_str(&json).unwrap();
    assert_eq!(back, schema);
    assert_eq!(back.content_hash(), schema.content_hash());
}

#[test]
fn test_enum_column_sql_type() {
    assert_eq!(
        ColumnType::Enum("PostStatus".into()).sql_type(),
        "\"post_status\""
    );
    assert_eq!(ColumnType::Double.sql_type(), "double precision");
}
