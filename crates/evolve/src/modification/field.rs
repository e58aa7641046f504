use super::{
    Precondition, column, ensure_column_free, ensure_field_free, ensure_unconstrained, entity,
    entity_mut, field_not_found, rename_key,
};
use evolve_schema::{Column, ColumnType, Field, Schema};
use evolve_sql::{ColumnDef, DdlBuilder};

fn ensure_enum_exists(schema: &Schema, col: &Column) -> Result<(), Precondition> {
    if let ColumnType::Enum(name) = &col.column_type {
        if schema.enumeration(name).is_none() {
            return Err(Precondition::EnumNotFound(name.clone()));
        }
    }
    Ok(())
}

pub(super) fn add(schema: &mut Schema, entity_name: &str, col: &Column) -> Result<(), Precondition> {
    ensure_enum_exists(schema, col)?;
    let e = entity_mut(schema, entity_name)?;
    ensure_field_free(e, &col.name)?;
    ensure_column_free(e, &col.column_name)?;
    e.fields.insert(col.name.clone(), Field::Column(col.clone()));
    Ok(())
}

pub(super) fn add_ddl(
    schema: &Schema,
    entity_name: &str,
    col: &Column,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    let e = entity(schema, entity_name)?;
    ddl.add_column(
        &e.table_name,
        &ColumnDef {
            name: &col.column_name,
            sql_type: col.column_type.sql_type(),
            nullable: col.nullable,
            default: col.default.as_deref(),
        },
    );
    Ok(())
}

pub(super) fn remove(schema: &mut Schema, entity_name: &str, field: &str) -> Result<(), Precondition> {
    let e = entity_mut(schema, entity_name)?;
    column(e, field)?;
    if e.primary == field {
        return Err(Precondition::FieldIsPrimary {
            entity: e.name.clone(),
            field: field.to_string(),
        });
    }
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
    ddl.drop_column(&e.table_name, &column(e, field)?.column_name);
    Ok(())
}

pub(super) fn update(schema: &mut Schema, entity_name: &str, col: &Column) -> Result<(), Precondition> {
    ensure_enum_exists(schema, col)?;
    let e = entity_mut(schema, entity_name)?;
    let current = column(e, &col.name)?;
    if current.column_name != col.column_name {
        return Err(Precondition::ColumnNameMismatch {
            entity: e.name.clone(),
            field: col.name.clone(),
            expected: col.column_name.clone(),
            actual: current.column_name.clone(),
        });
    }
    if e.primary == col.name && col.nullable {
        return Err(Precondition::InvalidPayload(format!(
            "primary column `{}.{}` cannot become nullable",
            e.name, col.name
        )));
    }
    if let Some(slot) = e.fields.get_mut(&col.name) {
        *slot = Field::Column(col.clone());
    }
    Ok(())
}

pub(super) fn update_ddl(
    schema: &Schema,
    entity_name: &str,
    col: &Column,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    let e = entity(schema, entity_name)?;
    let current = column(e, &col.name)?;
    if current.column_type != col.column_type {
        ddl.alter_column_type(&e.table_name, &col.column_name, &col.column_type.sql_type());
    }
    if current.nullable != col.nullable {
        ddl.set_nullable(&e.table_name, &col.column_name, col.nullable);
    }
    if current.default != col.default {
        ddl.set_default(&e.table_name, &col.column_name, col.default.as_deref());
    }
    Ok(())
}

pub(super) fn update_column_name(
    schema: &mut Schema,
    entity_name: &str,
    field: &str,
    column_name: &str,
) -> Result<(), Precondition> {
    let e = entity_mut(schema, entity_name)?;
    column(e, field)?;
    ensure_column_free(e, column_name)?;
    if let Some(Field::Column(col)) = e.fields.get_mut(field) {
        col.column_name = column_name.to_string();
    }
    Ok(())
}

pub(super) fn update_column_name_ddl(
    schema: &Schema,
    entity_name: &str,
    field: &str,
    column_name: &str,
    ddl: &mut DdlBuilder,
) -> Result<(), Precondition> {
    let e = entity(schema, entity_name)?;
    ddl.rename_column(&e.table_name, &column(e, field)?.column_name, column_name);
    Ok(())
}

/// Rename a field without touching storage.
///
/// Constraint field lists, the primary key and any relation whose inverse
/// points at the field are updated along with it.
pub(super) fn rename(
    schema: &mut Schema,
    entity_name: &str,
    field: &str,
    new_name: &str,
) -> Result<(), Precondition> {
    let e = entity_mut(schema, entity_name)?;
    if !e.fields.contains_key(field) {
        return Err(field_not_found(e, field));
    }
    ensure_field_free(e, new_name)?;

    if let Some(renamed) = rename_key(&mut e.fields, field, new_name) {
        renamed.set_name(new_name);
    }
    if e.primary == field {
        e.primary = new_name.to_string();
    }
    let lists = e
        .unique
        .values_mut()
        .map(|u| &mut u.fields)
        .chain(e.indexes.values_mut().map(|i| &mut i.fields));
    for list in lists {
        for f in list.iter_mut().filter(|f| f.as_str() == field) {
            *f = new_name.to_string();
        }
    }

    for other in schema.entities.values_mut() {
        for f in other.fields.values_mut() {
            if let Field::Relation(rel) = f {
                if rel.target == entity_name && rel.inverse.as_deref() == Some(field) {
                    rel.inverse = Some(new_name.to_string());
                }
            }
        }
    }
    Ok(())
}
