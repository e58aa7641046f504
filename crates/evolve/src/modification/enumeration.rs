use super::Precondition;
use evolve_schema::{ColumnType, Enum, Schema};
use evolve_sql::{DdlBuilder, snake_case};
use std::collections::HashSet;

fn check_values(name: &str, values: &[String]) -> Result<(), Precondition> {
    if values.is_empty() {
        return Err(Precondition::InvalidPayload(format!(
            "enum `{}` needs at least one value",
            name
        )));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = values.iter().find(|v| !seen.insert(*v)) {
        return Err(Precondition::InvalidPayload(format!(
            "enum `{}` lists `{}` twice",
            name, dup
        )));
    }
    Ok(())
}

pub(super) fn create(schema: &mut Schema, name: &str, values: &[String]) -> Result<(), Precondition> {
    if schema.enums.contains_key(name) {
        return Err(Precondition::EnumAlreadyExists(name.to_string()));
    }
    check_values(name, values)?;
    schema
        .enums
        .insert(name.to_string(), Enum::new(name, values.iter().cloned()));
    Ok(())
}

pub(super) fn update(schema: &mut Schema, name: &str, values: &[String]) -> Result<(), Precondition> {
    check_values(name, values)?;
    let e = schema
        .enums
        .get_mut(name)
        .ok_or_else(|| Precondition::EnumNotFound(name.to_string()))?;
    e.values = values.to_vec();
    Ok(())
}

pub(super) fn remove(schema: &mut Schema, name: &str) -> Result<(), Precondition> {
    if !schema.enums.contains_key(name) {
        return Err(Precondition::EnumNotFound(name.to_string()));
    }
    for entity in schema.entities.values() {
        for col in entity.columns() {
            if col.column_type == ColumnType::Enum(name.to_string()) {
                return Err(Precondition::EnumInUse {
                    name: name.to_string(),
                    by: format!("{}.{}", entity.name, col.name),
                });
            }
        }
    }
    schema.enums.shift_remove(name);
    Ok(())
}

pub(super) fn create_ddl(name: &str, values: &[String], ddl: &mut DdlBuilder) {
    ddl.create_domain(&snake_case(name), values);
}

pub(super) fn update_ddl(name: &str, values: &[String], ddl: &mut DdlBuilder) {
    ddl.replace_domain_check(&snake_case(name), values);
}

pub(super) fn remove_ddl(name: &str, ddl: &mut DdlBuilder) {
    ddl.drop_domain(&snake_case(name));
}
