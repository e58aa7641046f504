use super::{Precondition, entity, entity_mut};
use evolve_schema::{Entity, Index, Schema, UniqueConstraint};
use evolve_sql::DdlBuilder;

fn ensure_name_free(schema: &Schema, name: &str) -> Result<(), Precondition> {
    if super::relation_name_taken(schema, name) {
        return Err(Precondition::ConstraintNameTaken(name.to_string()));
    }
    Ok(())
}

fn check_fields(entity: &Entity, what: &str, name: &str, fields: &[String]) -> Result<(), Precondition> {
    if fields.is_empty() {
        return Err(Precondition::InvalidPayload(format!(
            "{} `{}` has no fields",
            what, name
        )));
    }
    for field in fields {
        if !entity.fields.contains_key(field) {
            return Err(Precondition::FieldNotFound {
                entity: entity.name.clone(),
                field: field.clone(),
            });
        }
        if entity.storage_column(field).is_none() {
            return Err(Precondition::NoStorageColumn {
                entity: entity.name.clone(),
                field: field.clone(),
            });
        }
    }
    Ok(())
}

/// Storage columns of `fields`. Callers have already run [`check_fields`]
/// against the same entity.
fn storage_columns<'a>(entity: &'a Entity, fields: &[String]) -> Result<Vec<&'a str>, Precondition> {
    fields
        .iter()
        .map(|field| {
            entity
                .storage_column(field)
                .ok_or_else(|| Precondition::NoStorageColumn {
                    entity: entity.name.clone(),
                    field: field.clone(),
                })
        })
        .collect()
}

pub(super) fn add_unique(
    schema: &mut Schema,
    entity_name: &str,
    unique: &UniqueConstraint,
) -> Result<(), Precondition> {
    ensure_name_free(schema, &unique.name)?;
    let e = entity_mut(schema, entity_name)?;
    check_fields(e, "unique constraint", &unique.name, &unique.fields)?;
    if let Some(other) = e.unique.values().find(|u| u.fields == unique.fields) {
        return Err(Precondition::InvalidPayload(format!(
            "unique constraint `{}` already covers ({})",
            other.name,
            unique.fields.join(", ")
        )));
    }
    e.unique.insert(unique.name.clone(), unique.clone());
    Ok(())
}

pub(super) fn add_unique_ddl(
    schema: &Schema,
    entity_name: &str,
    unique: &UniqueConstraint,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    let e = entity(schema, entity_name)?;
    let columns = storage_columns(e, &unique.fields)?;
    ddl.add_unique(&e.table_name, &unique.name, &columns);
    Ok(())
}

pub(super) fn remove_unique(
    schema: &mut Schema,
    entity_name: &str,
    name: &str,
) -> Result<(), Precondition> {
    let e = entity_mut(schema, entity_name)?;
    if e.unique.shift_remove(name).is_none() {
        return Err(Precondition::ConstraintNotFound {
            entity: entity_name.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

pub(super) fn remove_unique_ddl(
    schema: &Schema,
    entity_name: &str,
    name: &str,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    ddl.drop_constraint(&entity(schema, entity_name)?.table_name, name);
    Ok(())
}

pub(super) fn rename(
    schema: &mut Schema,
    entity_name: &str,
    from: &str,
    to: &str,
) -> Result<(), Precondition> {
    if !entity(schema, entity_name)?.unique.contains_key(from) {
        return Err(Precondition::ConstraintNotFound {
            entity: entity_name.to_string(),
            name: from.to_string(),
        });
    }
    ensure_name_free(schema, to)?;
    let e = entity_mut(schema, entity_name)?;
    if let Some(renamed) = super::rename_key(&mut e.unique, from, to) {
        renamed.name = to.to_string();
    }
    Ok(())
}

/// Renaming a unique constraint renames its backing index too.
pub(super) fn rename_ddl(
    schema: &Schema,
    entity_name: &str,
    from: &str,
    to: &str,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    ddl.rename_constraint(&entity(schema, entity_name)?.table_name, from, to);
    Ok(())
}

pub(super) fn add_index(schema: &mut Schema, entity_name: &str, index: &Index) -> Result<(), Precondition> {
    ensure_name_free(schema, &index.name)?;
    let e = entity_mut(schema, entity_name)?;
    check_fields(e, "index", &index.name, &index.fields)?;
    e.indexes.insert(index.name.clone(), index.clone());
    Ok(())
}

pub(super) fn add_index_ddl(
    schema: &Schema,
    entity_name: &str,
    index: &Index,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    let e = entity(schema, entity_name)?;
    let columns = storage_columns(e, &index.fields)?;
    ddl.create_index(&index.name, &e.table_name, &columns);
    Ok(())
}

pub(super) fn remove_index(schema: &mut Schema, entity_name: &str, name: &str) -> Result<(), Precondition> {
    let e = entity_mut(schema, entity_name)?;
    if e.indexes.shift_remove(name).is_none() {
        return Err(Precondition::IndexNotFound {
            entity: entity_name.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}
