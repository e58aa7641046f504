use super::{Precondition, ensure_table_free, entity};
use evolve_schema::{Entity, Field, Schema};
use evolve_sql::{ColumnDef, DdlBuilder, foreign_key_name};

pub(super) fn create(schema: &mut Schema, new: &Entity) -> Result<(), Precondition> {
    if schema.entities.contains_key(&new.name) {
        return Err(Precondition::EntityAlreadyExists(new.name.clone()));
    }
    ensure_table_free(schema, &new.table_name)?;
    match new.primary_column() {
        Some(col) if !col.nullable => {}
        _ => {
            return Err(Precondition::InvalidPayload(format!(
                "entity `{}` needs a non-nullable primary column `{}`",
                new.name, new.primary
            )));
        }
    }
    if new.fields.len() != 1 || !new.unique.is_empty() || !new.indexes.is_empty() {
        return Err(Precondition::InvalidPayload(format!(
            "entity `{}` must be created with its primary column only",
            new.name
        )));
    }
    schema.entities.insert(new.name.clone(), new.clone());
    Ok(())
}

pub(super) fn create_ddl(new: &Entity, ddl: &mut DdlBuilder) {
    let columns: Vec<ColumnDef<'_>> = new
        .columns()
        .map(|col| ColumnDef {
            name: &col.column_name,
            sql_type: col.column_type.sql_type(),
            nullable: col.nullable,
            default: col.default.as_deref(),
        })
        .collect();
    let primary: Vec<&str> = new
        .primary_column()
        .map(|col| col.column_name.as_str())
        .into_iter()
        .collect();
    ddl.create_table(&new.table_name, &columns, &primary);
}

pub(super) fn remove(schema: &mut Schema, name: &str) -> Result<(), Precondition> {
    let target = entity(schema, name)?;
    if let Some(rel) = target.relations().find(|r| r.join_table().is_some()) {
        return Err(Precondition::FieldInUse {
            entity: name.to_string(),
            field: rel.name.clone(),
            by: "its junction table".to_string(),
        });
    }
    if let Some((by, rel)) = schema.relations_targeting(name).find(|(e, _)| e.name != name) {
        return Err(Precondition::EntityReferenced {
            entity: name.to_string(),
            by: format!("{}.{}", by.name, rel.name),
        });
    }
    schema.entities.shift_remove(name);
    Ok(())
}

pub(super) fn remove_ddl(
    schema: &Schema,
    name: &str,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    ddl.drop_table(&entity(schema, name)?.table_name);
    Ok(())
}

pub(super) fn update_table_name(
    schema: &mut Schema,
    name: &str,
    table_name: &str,
) -> Result<(), Precondition> {
    entity(schema, name)?;
    ensure_table_free(schema, table_name)?;
    if let Some(e) = schema.entities.get_mut(name) {
        e.table_name = table_name.to_string();
    }
    Ok(())
}

/// Foreign key names embed the table name, so they follow the table.
pub(super) fn update_table_name_ddl(
    schema: &Schema,
    name: &str,
    table_name: &str,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    let e = entity(schema, name)?;
    ddl.rename_table(&e.table_name, table_name);
    for field in e.fields.values() {
        if let Field::Relation(rel) = field {
            if let Some(jc) = rel.join_column() {
                let from = foreign_key_name(&e.table_name, &jc.column_name);
                let to = foreign_key_name(table_name, &jc.column_name);
                if from != to {
                    ddl.rename_constraint(table_name, &from, &to);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::Modification;
    use evolve_schema::{
        Column, ColumnType, EntityBuilder, OnDelete, RelationBuilder, Schema, SchemaBuilder,
    };
    use evolve_sql::DdlBuilder;

    fn blog() -> Schema {
        SchemaBuilder::new()
            .entity(EntityBuilder::new("Post").column(Column::new("title", ColumnType::String)))
            .entity(
                EntityBuilder::new("Comment")
                    .relation(RelationBuilder::many_has_one("post", "Post").on_delete(OnDelete::Cascade)),
            )
            .build()
            .unwrap()
    }

    fn ddl(schema: &Schema, m: &Modification) -> String {
        let mut ddl = DdlBuilder::new();
        m.apply_to_database(schema, &mut ddl).unwrap();
        ddl.to_sql()
    }

    #[test]
    fn test_create_entity() {
        let schema = blog();
        let mut tag = schema.entities["Post"].clone();
        tag.name = "Tag".into();
        tag.table_name = "tag".into();
        tag.fields.retain(|name, _| name == "id");

        let m = Modification::CreateEntity { entity: tag };
        let next = m.apply_to_schema(&schema).unwrap();
        assert!(next.entity("Tag").is_some());
        insta::assert_snapshot!(ddl(&schema, &m), @r#"
        CREATE TABLE "tag" (
            "id" uuid NOT NULL,
            PRIMARY KEY ("id")
        );
        "#);

        // Fields beyond the primary key arrive through addField.
        let mut bad = schema.entities["Post"].clone();
        bad.name = "Other".into();
        bad.table_name = "other".into();
        let err = Modification::CreateEntity { entity: bad }
            .apply_to_schema(&schema)
            .unwrap_err();
        assert!(err.to_string().contains("primary column only"), "{}", err);
    }

    #[test]
    fn test_create_entity_table_taken() {
        let schema = blog();
        let mut clash = schema.entities["Post"].clone();
        clash.name = "Article".into();
        clash.fields.retain(|name, _| name == "id");
        let err = Modification::CreateEntity { entity: clash }
            .apply_to_schema(&schema)
            .unwrap_err();
        assert_eq!(
            err.precondition,
            crate::Precondition::TableNameTaken("post".into())
        );
    }

    #[test]
    fn test_table_names_share_the_constraint_namespace() {
        let schema = SchemaBuilder::new()
            .entity(
                EntityBuilder::new("Post")
                    .column(Column::new("slug", ColumnType::String))
                    .column(Column::new("title", ColumnType::String))
                    .named_unique("foo", ["slug"])
                    .named_index("bar", ["title"]),
            )
            .build()
            .unwrap();

        let mut tag = schema.entities["Post"].clone();
        tag.name = "Tag".into();
        tag.table_name = "foo".into();
        tag.fields.retain(|name, _| name == "id");
        tag.unique.clear();
        tag.indexes.clear();
        let err = Modification::CreateEntity { entity: tag }
            .apply_to_schema(&schema)
            .unwrap_err();
        assert_eq!(
            err.precondition,
            crate::Precondition::TableNameTaken("foo".into())
        );

        let err = Modification::UpdateEntityTableName {
            entity_name: "Post".into(),
            table_name: "bar".into(),
        }
        .apply_to_schema(&schema)
        .unwrap_err();
        assert_eq!(
            err.precondition,
            crate::Precondition::TableNameTaken("bar".into())
        );
    }

    #[test]
    fn test_remove_referenced_entity_fails() {
        let schema = blog();
        let err = Modification::RemoveEntity {
            entity_name: "Post".into(),
        }
        .apply_to_schema(&schema)
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot apply `- entity Post`: entity `Post` is still referenced by `Comment.post`"
        );

        let m = Modification::RemoveEntity {
            entity_name: "Comment".into(),
        };
        let next = m.apply_to_schema(&schema).unwrap();
        assert!(next.entity("Comment").is_none());
        insta::assert_snapshot!(ddl(&schema, &m), @r#"DROP TABLE "comment";"#);
    }

    #[test]
    fn test_table_rename_moves_foreign_key_names() {
        let schema = blog();
        let m = Modification::UpdateEntityTableName {
            entity_name: "Comment".into(),
            table_name: "post_comment".into(),
        };
        assert_eq!(
            m.apply_to_schema(&schema).unwrap().entities["Comment"].table_name,
            "post_comment"
        );
        insta::assert_snapshot!(ddl(&schema, &m), @r#"
        ALTER TABLE "comment" RENAME TO "post_comment";
        ALTER TABLE "post_comment" RENAME CONSTRAINT "comment_post_id_fkey" TO "post_comment_post_id_fkey";
        "#);
    }
}
