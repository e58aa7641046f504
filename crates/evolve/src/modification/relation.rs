use super::{
    Precondition, ensure_column_free, ensure_field_free, ensure_table_free, ensure_unconstrained,
    entity, entity_mut, relation,
};
use evolve_schema::{Field, Joining, OnDelete, Relation, RelationKind, Schema};
use evolve_sql::{ColumnDef, DdlBuilder, ForeignKeyDef, ReferentialAction, foreign_key_name};

fn check_shape(entity_name: &str, rel: &Relation) -> Result<(), Precondition> {
    let ok = match (rel.kind, &rel.joining) {
        (RelationKind::ManyHasOne, Some(Joining::Column(_))) => true,
        (RelationKind::OneHasMany, None) => true,
        (RelationKind::OneHasOne, Some(Joining::Column(_)) | None) => true,
        (RelationKind::ManyHasMany, Some(Joining::Table(_)) | None) => true,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Precondition::InvalidPayload(format!(
            "{} relation `{}.{}` cannot be stored this way",
            rel.kind, entity_name, rel.name
        )))
    }
}

pub(super) fn add(schema: &mut Schema, entity_name: &str, rel: &Relation) -> Result<(), Precondition> {
    check_shape(entity_name, rel)?;
    entity(schema, &rel.target)?;
    if let Some(jt) = rel.join_table() {
        ensure_table_free(schema, &jt.table_name)?;
    }
    let e = entity_mut(schema, entity_name)?;
    ensure_field_free(e, &rel.name)?;
    if let Some(jc) = rel.join_column() {
        ensure_column_free(e, &jc.column_name)?;
    }
    e.fields.insert(rel.name.clone(), Field::Relation(rel.clone()));
    Ok(())
}

/// Table and primary key column a foreign key to `target` points at.
fn referenced_key<'a>(schema: &'a Schema, target: &str) -> Result<(&'a str, &'a str), Precondition> {
    let e = entity(schema, target)?;
    let column = schema
        .key_column_name(target)
        .ok_or_else(|| Precondition::InvalidPayload(format!("`{}` has no primary column", target)))?;
    Ok((&e.table_name, column))
}

fn key_type(schema: &Schema, entity_name: &str) -> Result<String, Precondition> {
    schema.key_sql_type(entity_name).ok_or_else(|| {
        Precondition::InvalidPayload(format!("`{}` has no primary column", entity_name))
    })
}

pub(super) fn add_ddl(
    schema: &Schema,
    entity_name: &str,
    rel: &Relation,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    let owner = entity(schema, entity_name)?;
    match &rel.joining {
        Some(Joining::Column(jc)) => {
            ddl.add_column(
                &owner.table_name,
                &ColumnDef {
                    name: &jc.column_name,
                    sql_type: key_type(schema, &rel.target)?,
                    nullable: rel.nullable,
                    default: None,
                },
            );
            let (references_table, references_column) = referenced_key(schema, &rel.target)?;
            let name = foreign_key_name(&owner.table_name, &jc.column_name);
            ddl.add_foreign_key(
                &owner.table_name,
                &ForeignKeyDef {
                    name: &name,
                    column: &jc.column_name,
                    references_table,
                    references_column,
                    on_delete: jc.on_delete.to_action(),
                },
            );
        }
        Some(Joining::Table(jt)) => {
            ddl.create_table(
                &jt.table_name,
                &[
                    ColumnDef {
                        name: &jt.join_column,
                        sql_type: key_type(schema, entity_name)?,
                        nullable: false,
                        default: None,
                    },
                    ColumnDef {
                        name: &jt.inverse_join_column,
                        sql_type: key_type(schema, &rel.target)?,
                        nullable: false,
                        default: None,
                    },
                ],
                &[jt.join_column.as_str(), jt.inverse_join_column.as_str()],
            );
            for (column, side) in [
                (&jt.join_column, entity_name),
                (&jt.inverse_join_column, rel.target.as_str()),
            ] {
                let name = foreign_key_name(&jt.table_name, column);
                let (references_table, references_column) = referenced_key(schema, side)?;
                ddl.add_foreign_key(
                    &jt.table_name,
                    &ForeignKeyDef {
                        name: &name,
                        column,
                        references_table,
                        references_column,
                        on_delete: ReferentialAction::Cascade,
                    },
                );
            }
        }
        None => {}
    }
    Ok(())
}

pub(super) fn remove(schema: &mut Schema, entity_name: &str, field: &str) -> Result<(), Precondition> {
    let e = entity_mut(schema, entity_name)?;
    relation(e, field)?;
    ensure_unconstrained(e, field)?;
    e.fields.shift_remove(field);
    Ok(())
}

pub(super) fn remove_ddl(
    schema: &Schema,
    entity_name: &str,
    field: &str,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    let e = entity(schema, entity_name)?;
    match &relation(e, field)?.joining {
        Some(Joining::Column(jc)) => ddl.drop_column(&e.table_name, &jc.column_name),
        Some(Joining::Table(jt)) => ddl.drop_table(&jt.table_name),
        None => {}
    }
    Ok(())
}

fn relation_mut<'a>(
    schema: &'a mut Schema,
    entity_name: &str,
    field: &str,
) -> Result<&'a mut Relation, Precondition> {
    let e = entity_mut(schema, entity_name)?;
    relation(e, field)?;
    match e.fields.get_mut(field) {
        Some(Field::Relation(rel)) => Ok(rel),
        _ => Err(Precondition::NotARelation {
            entity: entity_name.to_string(),
            field: field.to_string(),
        }),
    }
}

fn not_column_joined(entity_name: &str, field: &str) -> Precondition {
    Precondition::NotColumnJoined {
        entity: entity_name.to_string(),
        field: field.to_string(),
    }
}

pub(super) fn change_on_delete(
    schema: &mut Schema,
    entity_name: &str,
    field: &str,
    on_delete: OnDelete,
) -> Result<(), Precondition> {
    let rel = relation_mut(schema, entity_name, field)?;
    match &mut rel.joining {
        Some(Joining::Column(jc)) => {
            jc.on_delete = on_delete;
            Ok(())
        }
        _ => Err(not_column_joined(entity_name, field)),
    }
}

pub(super) fn change_on_delete_ddl(
    schema: &Schema,
    entity_name: &str,
    field: &str,
    on_delete: OnDelete,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    let owner = entity(schema, entity_name)?;
    let rel = relation(owner, field)?;
    let jc = rel
        .join_column()
        .ok_or_else(|| not_column_joined(entity_name, field))?;
    let (references_table, references_column) = referenced_key(schema, &rel.target)?;
    let name = foreign_key_name(&owner.table_name, &jc.column_name);
    ddl.drop_constraint(&owner.table_name, &name);
    ddl.add_foreign_key(
        &owner.table_name,
        &ForeignKeyDef {
            name: &name,
            column: &jc.column_name,
            references_table,
            references_column,
            on_delete: on_delete.to_action(),
        },
    );
    Ok(())
}

pub(super) fn change_inverse(
    schema: &mut Schema,
    entity_name: &str,
    field: &str,
    inverse: Option<&str>,
) -> Result<(), Precondition> {
    let rel = relation_mut(schema, entity_name, field)?;
    rel.inverse = inverse.map(str::to_string);
    Ok(())
}

pub(super) fn change_nullable(
    schema: &mut Schema,
    entity_name: &str,
    field: &str,
    nullable: bool,
) -> Result<(), Precondition> {
    relation_mut(schema, entity_name, field)?.nullable = nullable;
    Ok(())
}

/// Only column-joined relations have something to alter.
pub(super) fn change_nullable_ddl(
    schema: &Schema,
    entity_name: &str,
    field: &str,
    nullable: bool,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    let e = entity(schema, entity_name)?;
    if let Some(jc) = relation(e, field)?.join_column() {
        ddl.set_nullable(&e.table_name, &jc.column_name, nullable);
    }
    Ok(())
}

pub(super) fn change_joining_column(
    schema: &mut Schema,
    entity_name: &str,
    field: &str,
    column_name: &str,
) -> Result<(), Precondition> {
    ensure_column_free(entity(schema, entity_name)?, column_name)?;
    let rel = relation_mut(schema, entity_name, field)?;
    match &mut rel.joining {
        Some(Joining::Column(jc)) => {
            jc.column_name = column_name.to_string();
            Ok(())
        }
        _ => Err(not_column_joined(entity_name, field)),
    }
}

pub(super) fn change_joining_column_ddl(
    schema: &Schema,
    entity_name: &str,
    field: &str,
    column_name: &str,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    let e = entity(schema, entity_name)?;
    let jc = relation(e, field)?
        .join_column()
        .ok_or_else(|| not_column_joined(entity_name, field))?;
    ddl.rename_column(&e.table_name, &jc.column_name, column_name);
    let from = foreign_key_name(&e.table_name, &jc.column_name);
    let to = foreign_key_name(&e.table_name, column_name);
    if from != to {
        ddl.rename_constraint(&e.table_name, &from, &to);
    }
    Ok(())
}
