//! The modification catalog.
//!
//! A [`Modification`] is one atomic schema change. Every kind has two
//! interpretations that must agree:
//!
//! - [`Modification::apply_to_schema`] is the pure transform: it returns a new
//!   [`Schema`] or fails without touching its input.
//! - [`Modification::apply_to_database`] emits the Postgres DDL doing the same
//!   thing to a live database, given the schema *before* the change.
//!
//! Modifications only check their own preconditions. Putting them in an order
//! where those hold is the differ's job.

use evolve_schema::{Column, Entity, Index, OnDelete, Relation, Schema, UniqueConstraint};
use evolve_sql::DdlBuilder;
use facet::Facet;
use indexmap::IndexMap;
use std::fmt;

mod constraint;
mod entity;
mod enumeration;
mod field;
mod relation;

/// One atomic schema change.
///
/// Serialized internally tagged, e.g. `{"modification": "removeField", "entityName": "Post", "fieldName": "title"}`.
#[derive(Debug, Clone, PartialEq, Facet)]
#[facet(tag = "modification")]
#[facet(rename_all = "camelCase")]
#[repr(u8)]
pub enum Modification {
    CreateEnum {
        #[facet(rename = "enumName")]
        enum_name: String,
        values: Vec<String>,
    },
    UpdateEnum {
        #[facet(rename = "enumName")]
        enum_name: String,
        values: Vec<String>,
    },
    RemoveEnum {
        #[facet(rename = "enumName")]
        enum_name: String,
    },
    /// Create an entity holding only its primary key column.
    CreateEntity { entity: Entity },
    RemoveEntity {
        #[facet(rename = "entityName")]
        entity_name: String,
    },
    UpdateEntityTableName {
        #[facet(rename = "entityName")]
        entity_name: String,
        #[facet(rename = "tableName")]
        table_name: String,
    },
    AddField {
        #[facet(rename = "entityName")]
        entity_name: String,
        field: Column,
    },
    RemoveField {
        #[facet(rename = "entityName")]
        entity_name: String,
        #[facet(rename = "fieldName")]
        field_name: String,
    },
    /// Replace a column's type, nullability and default.
    UpdateField {
        #[facet(rename = "entityName")]
        entity_name: String,
        field: Column,
    },
    UpdateColumnName {
        #[facet(rename = "entityName")]
        entity_name: String,
        #[facet(rename = "fieldName")]
        field_name: String,
        #[facet(rename = "columnName")]
        column_name: String,
    },
    /// Logical rename. Storage is untouched.
    RenameField {
        #[facet(rename = "entityName")]
        entity_name: String,
        #[facet(rename = "fieldName")]
        field_name: String,
        #[facet(rename = "newFieldName")]
        new_field_name: String,
    },
    AddRelation {
        #[facet(rename = "entityName")]
        entity_name: String,
        relation: Relation,
    },
    RemoveRelation {
        #[facet(rename = "entityName")]
        entity_name: String,
        #[facet(rename = "fieldName")]
        field_name: String,
    },
    ChangeRelationOnDelete {
        #[facet(rename = "entityName")]
        entity_name: String,
        #[facet(rename = "fieldName")]
        field_name: String,
        #[facet(rename = "onDelete")]
        on_delete: OnDelete,
    },
    ChangeRelationInverse {
        #[facet(rename = "entityName")]
        entity_name: String,
        #[facet(rename = "fieldName")]
        field_name: String,
        #[facet(default)]
        inverse: Option<String>,
    },
    ChangeRelationNullable {
        #[facet(rename = "entityName")]
        entity_name: String,
        #[facet(rename = "fieldName")]
        field_name: String,
        nullable: bool,
    },
    ChangeJoiningColumn {
        #[facet(rename = "entityName")]
        entity_name: String,
        #[facet(rename = "fieldName")]
        field_name: String,
        #[facet(rename = "columnName")]
        column_name: String,
    },
    AddUniqueConstraint {
        #[facet(rename = "entityName")]
        entity_name: String,
        unique: UniqueConstraint,
    },
    RemoveUniqueConstraint {
        #[facet(rename = "entityName")]
        entity_name: String,
        #[facet(rename = "constraintName")]
        constraint_name: String,
    },
    RenameConstraint {
        #[facet(rename = "entityName")]
        entity_name: String,
        #[facet(rename = "constraintName")]
        constraint_name: String,
        #[facet(rename = "newName")]
        new_name: String,
    },
    AddIndex {
        #[facet(rename = "entityName")]
        entity_name: String,
        index: Index,
    },
    RemoveIndex {
        #[facet(rename = "entityName")]
        entity_name: String,
        #[facet(rename = "indexName")]
        index_name: String,
    },
}

/// A modification's precondition did not hold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply `{modification}`: {precondition}")]
pub struct ModificationApplicationError {
    /// The modification, as described by [`Modification::describe`].
    pub modification: String,
    pub precondition: Precondition,
}

/// The precondition that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Precondition {
    #[error("entity `{0}` does not exist")]
    EntityNotFound(String),
    #[error("entity `{0}` already exists")]
    EntityAlreadyExists(String),
    #[error("table name `{0}` is already in use")]
    TableNameTaken(String),
    #[error("entity `{entity}` is still referenced by `{by}`")]
    EntityReferenced { entity: String, by: String },
    #[error("field `{entity}.{field}` does not exist")]
    FieldNotFound { entity: String, field: String },
    #[error("field `{entity}.{field}` already exists")]
    FieldAlreadyExists { entity: String, field: String },
    #[error("field `{entity}.{field}` is not a column")]
    NotAColumn { entity: String, field: String },
    #[error("field `{entity}.{field}` is not a relation")]
    NotARelation { entity: String, field: String },
    #[error("relation `{entity}.{field}` is not stored in a joining column")]
    NotColumnJoined { entity: String, field: String },
    #[error("field `{entity}.{field}` is the primary key")]
    FieldIsPrimary { entity: String, field: String },
    #[error("field `{entity}.{field}` is used by `{by}`")]
    FieldInUse {
        entity: String,
        field: String,
        by: String,
    },
    #[error("field `{entity}.{field}` has no column on the entity's table")]
    NoStorageColumn { entity: String, field: String },
    #[error("column `{column}` is already in use on `{entity}`")]
    ColumnNameTaken { entity: String, column: String },
    #[error("column of `{entity}.{field}` is `{actual}`, not `{expected}`")]
    ColumnNameMismatch {
        entity: String,
        field: String,
        expected: String,
        actual: String,
    },
    #[error("enum `{0}` does not exist")]
    EnumNotFound(String),
    #[error("enum `{0}` already exists")]
    EnumAlreadyExists(String),
    #[error("enum `{name}` is used by `{by}`")]
    EnumInUse { name: String, by: String },
    #[error("unique constraint `{name}` does not exist on `{entity}`")]
    ConstraintNotFound { entity: String, name: String },
    #[error("index `{name}` does not exist on `{entity}`")]
    IndexNotFound { entity: String, name: String },
    #[error("name `{0}` is already used by another constraint or index")]
    ConstraintNameTaken(String),
    #[error("{0}")]
    InvalidPayload(String),
}

impl Modification {
    /// Every kind name the catalog can read.
    pub const KINDS: &'static [&'static str] = &[
        "createEnum",
        "updateEnum",
        "removeEnum",
        "createEntity",
        "removeEntity",
        "updateEntityTableName",
        "addField",
        "removeField",
        "updateField",
        "updateColumnName",
        "renameField",
        "addRelation",
        "removeRelation",
        "changeRelationOnDelete",
        "changeRelationInverse",
        "changeRelationNullable",
        "changeJoiningColumn",
        "addUniqueConstraint",
        "removeUniqueConstraint",
        "renameConstraint",
        "addIndex",
        "removeIndex",
    ];

    /// The serialized kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            Modification::CreateEnum { .. } => "createEnum",
            Modification::UpdateEnum { .. } => "updateEnum",
            Modification::RemoveEnum { .. } => "removeEnum",
            Modification::CreateEntity { .. } => "createEntity",
            Modification::RemoveEntity { .. } => "removeEntity",
            Modification::UpdateEntityTableName { .. } => "updateEntityTableName",
            Modification::AddField { .. } => "addField",
            Modification::RemoveField { .. } => "removeField",
            Modification::UpdateField { .. } => "updateField",
            Modification::UpdateColumnName { .. } => "updateColumnName",
            Modification::RenameField { .. } => "renameField",
            Modification::AddRelation { .. } => "addRelation",
            Modification::RemoveRelation { .. } => "removeRelation",
            Modification::ChangeRelationOnDelete { .. } => "changeRelationOnDelete",
            Modification::ChangeRelationInverse { .. } => "changeRelationInverse",
            Modification::ChangeRelationNullable { .. } => "changeRelationNullable",
            Modification::ChangeJoiningColumn { .. } => "changeJoiningColumn",
            Modification::AddUniqueConstraint { .. } => "addUniqueConstraint",
            Modification::RemoveUniqueConstraint { .. } => "removeUniqueConstraint",
            Modification::RenameConstraint { .. } => "renameConstraint",
            Modification::AddIndex { .. } => "addIndex",
            Modification::RemoveIndex { .. } => "removeIndex",
        }
    }

    /// Whether this modification drops something.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Modification::RemoveEnum { .. }
                | Modification::RemoveEntity { .. }
                | Modification::RemoveField { .. }
                | Modification::RemoveRelation { .. }
        )
    }

    /// Human-readable one-line summary.
    pub fn describe(&self) -> String {
        self.to_string()
    }

    /// Apply the pure transform. The input is never modified.
    pub fn apply_to_schema(&self, schema: &Schema) -> Result<Schema, ModificationApplicationError> {
        let mut next = schema.clone();
        self.apply_in_place(&mut next).map_err(|precondition| self.error(precondition))?;
        Ok(next)
    }

    /// Emit the DDL that has the same effect as [`Self::apply_to_schema`].
    ///
    /// `schema` is the state *before* this modification. Preconditions are
    /// checked first, so nothing is emitted for a modification that would not
    /// apply.
    pub fn apply_to_database(
        &self,
        schema: &Schema,
        ddl: &mut DdlBuilder,
    ) -> Result<(), ModificationApplicationError> {
        self.apply_to_schema(schema)?;
        self.emit(schema, ddl).map_err(|precondition| self.error(precondition))
    }

    fn error(&self, precondition: Precondition) -> ModificationApplicationError {
        ModificationApplicationError {
            modification: self.describe(),
            precondition,
        }
    }

    fn apply_in_place(&self, schema: &mut Schema) -> Result<(), Precondition> {
        match self {
            Modification::CreateEnum { enum_name, values } => {
                enumeration::create(schema, enum_name, values)
            }
            Modification::UpdateEnum { enum_name, values } => {
                enumeration::update(schema, enum_name, values)
            }
            Modification::RemoveEnum { enum_name } => enumeration::remove(schema, enum_name),
            Modification::CreateEntity { entity } => entity::create(schema, entity),
            Modification::RemoveEntity { entity_name } => entity::remove(schema, entity_name),
            Modification::UpdateEntityTableName {
                entity_name,
                table_name,
            } => entity::update_table_name(schema, entity_name, table_name),
            Modification::AddField { entity_name, field } => {
                field::add(schema, entity_name, field)
            }
            Modification::RemoveField {
                entity_name,
                field_name,
            } => field::remove(schema, entity_name, field_name),
            Modification::UpdateField { entity_name, field } => {
                field::update(schema, entity_name, field)
            }
            Modification::UpdateColumnName {
                entity_name,
                field_name,
                column_name,
            } => field::update_column_name(schema, entity_name, field_name, column_name),
            Modification::RenameField {
                entity_name,
                field_name,
                new_field_name,
            } => field::rename(schema, entity_name, field_name, new_field_name),
            Modification::AddRelation {
                entity_name,
                relation,
            } => relation::add(schema, entity_name, relation),
            Modification::RemoveRelation {
                entity_name,
                field_name,
            } => relation::remove(schema, entity_name, field_name),
            Modification::ChangeRelationOnDelete {
                entity_name,
                field_name,
                on_delete,
            } => relation::change_on_delete(schema, entity_name, field_name, *on_delete),
            Modification::ChangeRelationInverse {
                entity_name,
                field_name,
                inverse,
            } => relation::change_inverse(schema, entity_name, field_name, inverse.as_deref()),
            Modification::ChangeRelationNullable {
                entity_name,
                field_name,
                nullable,
            } => relation::change_nullable(schema, entity_name, field_name, *nullable),
            Modification::ChangeJoiningColumn {
                entity_name,
                field_name,
                column_name,
            } => relation::change_joining_column(schema, entity_name, field_name, column_name),
            Modification::AddUniqueConstraint {
                entity_name,
                unique,
            } => constraint::add_unique(schema, entity_name, unique),
            Modification::RemoveUniqueConstraint {
                entity_name,
                constraint_name,
            } => constraint::remove_unique(schema, entity_name, constraint_name),
            Modification::RenameConstraint {
                entity_name,
                constraint_name,
                new_name,
            } => constraint::rename(schema, entity_name, constraint_name, new_name),
            Modification::AddIndex { entity_name, index } => {
                constraint::add_index(schema, entity_name, index)
            }
            Modification::RemoveIndex {
                entity_name,
                index_name,
            } => constraint::remove_index(schema, entity_name, index_name),
        }
    }

    fn emit(&self, schema: &Schema, ddl: &mut DdlBuilder) -> Result<(), Precondition> {
        match self {
            Modification::CreateEnum { enum_name, values } => {
                enumeration::create_ddl(enum_name, values, ddl);
                Ok(())
            }
            Modification::UpdateEnum { enum_name, values } => {
                enumeration::update_ddl(enum_name, values, ddl);
                Ok(())
            }
            Modification::RemoveEnum { enum_name } => {
                enumeration::remove_ddl(enum_name, ddl);
                Ok(())
            }
            Modification::CreateEntity { entity } => {
                entity::create_ddl(entity, ddl);
                Ok(())
            }
            Modification::RemoveEntity { entity_name } => {
                entity::remove_ddl(schema, entity_name, ddl)
            }
            Modification::UpdateEntityTableName {
                entity_name,
                table_name,
            } => entity::update_table_name_ddl(schema, entity_name, table_name, ddl),
            Modification::AddField { entity_name, field } => {
                field::add_ddl(schema, entity_name, field, ddl)
            }
            Modification::RemoveField {
                entity_name,
                field_name,
            } => field::remove_ddl(schema, entity_name, field_name, ddl),
            Modification::UpdateField { entity_name, field } => {
                field::update_ddl(schema, entity_name, field, ddl)
            }
            Modification::UpdateColumnName {
                entity_name,
                field_name,
                column_name,
            } => field::update_column_name_ddl(schema, entity_name, field_name, column_name, ddl),
            Modification::RenameField { .. } | Modification::ChangeRelationInverse { .. } => Ok(()),
            Modification::AddRelation {
                entity_name,
                relation,
            } => relation::add_ddl(schema, entity_name, relation, ddl),
            Modification::RemoveRelation {
                entity_name,
                field_name,
            } => relation::remove_ddl(schema, entity_name, field_name, ddl),
            Modification::ChangeRelationOnDelete {
                entity_name,
                field_name,
                on_delete,
            } => relation::change_on_delete_ddl(schema, entity_name, field_name, *on_delete, ddl),
            Modification::ChangeRelationNullable {
                entity_name,
                field_name,
                nullable,
            } => relation::change_nullable_ddl(schema, entity_name, field_name, *nullable, ddl),
            Modification::ChangeJoiningColumn {
                entity_name,
                field_name,
                column_name,
            } => relation::change_joining_column_ddl(
                schema,
                entity_name,
                field_name,
                column_name,
                ddl,
            ),
            Modification::AddUniqueConstraint {
                entity_name,
                unique,
            } => constraint::add_unique_ddl(schema, entity_name, unique, ddl),
            Modification::RemoveUniqueConstraint {
                entity_name,
                constraint_name,
            } => constraint::remove_unique_ddl(schema, entity_name, constraint_name, ddl),
            Modification::RenameConstraint {
                entity_name,
                constraint_name,
                new_name,
            } => constraint::rename_ddl(schema, entity_name, constraint_name, new_name, ddl),
            Modification::AddIndex { entity_name, index } => {
                constraint::add_index_ddl(schema, entity_name, index, ddl)
            }
            Modification::RemoveIndex { index_name, .. } => {
                ddl.drop_index(index_name);
                Ok(())
            }
        }
    }
}

/// A fold over a modification list stopped at `index`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("modification #{index}: {error}")]
pub struct FoldError {
    pub index: usize,
    #[source]
    pub error: ModificationApplicationError,
}

/// Apply `modifications` in order, starting from `schema`.
pub fn apply_modifications(
    schema: &Schema,
    modifications: &[Modification],
) -> Result<Schema, FoldError> {
    let mut current = schema.clone();
    for (index, modification) in modifications.iter().enumerate() {
        current = modification
            .apply_to_schema(&current)
            .map_err(|error| FoldError { index, error })?;
    }
    Ok(current)
}

/// DDL for a whole modification list, folding the schema as it goes.
pub fn to_ddl(schema: &Schema, modifications: &[Modification]) -> Result<DdlBuilder, FoldError> {
    let mut ddl = DdlBuilder::new();
    let mut current = schema.clone();
    for (index, modification) in modifications.iter().enumerate() {
        modification
            .apply_to_database(&current, &mut ddl)
            .map_err(|error| FoldError { index, error })?;
        current = modification
            .apply_to_schema(&current)
            .map_err(|error| FoldError { index, error })?;
    }
    Ok(ddl)
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modification::CreateEnum { enum_name, values } => {
                write!(f, "+ enum {} ({})", enum_name, values.join(", "))
            }
            Modification::UpdateEnum { enum_name, values } => {
                write!(f, "~ enum {} ({})", enum_name, values.join(", "))
            }
            Modification::RemoveEnum { enum_name } => write!(f, "- enum {}", enum_name),
            Modification::CreateEntity { entity } => {
                write!(f, "+ entity {} ({})", entity.name, entity.table_name)
            }
            Modification::RemoveEntity { entity_name } => write!(f, "- entity {}", entity_name),
            Modification::UpdateEntityTableName {
                entity_name,
                table_name,
            } => write!(f, "~ entity {} table -> {}", entity_name, table_name),
            Modification::AddField { entity_name, field } => {
                write!(f, "+ {}.{}", entity_name, field)
            }
            Modification::RemoveField {
                entity_name,
                field_name,
            } => write!(f, "- {}.{}", entity_name, field_name),
            Modification::UpdateField { entity_name, field } => {
                write!(f, "~ {}.{}", entity_name, field)
            }
            Modification::UpdateColumnName {
                entity_name,
                field_name,
                column_name,
            } => write!(f, "~ {}.{} column -> {}", entity_name, field_name, column_name),
            Modification::RenameField {
                entity_name,
                field_name,
                new_field_name,
            } => write!(f, "~ {}.{} -> {}", entity_name, field_name, new_field_name),
            Modification::AddRelation {
                entity_name,
                relation,
            } => write!(f, "+ {}.{}", entity_name, relation),
            Modification::RemoveRelation {
                entity_name,
                field_name,
            } => write!(f, "- {}.{}", entity_name, field_name),
            Modification::ChangeRelationOnDelete {
                entity_name,
                field_name,
                on_delete,
            } => write!(f, "~ {}.{} on delete {}", entity_name, field_name, on_delete),
            Modification::ChangeRelationInverse {
                entity_name,
                field_name,
                inverse,
            } => match inverse {
                Some(inverse) => {
                    write!(f, "~ {}.{} inverse {}", entity_name, field_name, inverse)
                }
                None => write!(f, "~ {}.{} no inverse", entity_name, field_name),
            },
            Modification::ChangeRelationNullable {
                entity_name,
                field_name,
                nullable,
            } => {
                let what = if *nullable { "nullable" } else { "not null" };
                write!(f, "~ {}.{} {}", entity_name, field_name, what)
            }
            Modification::ChangeJoiningColumn {
                entity_name,
                field_name,
                column_name,
            } => write!(f, "~ {}.{} via {}", entity_name, field_name, column_name),
            Modification::AddUniqueConstraint {
                entity_name,
                unique,
            } => write!(
                f,
                "+ {} unique {} ({})",
                entity_name,
                unique.name,
                unique.fields.join(", ")
            ),
            Modification::RemoveUniqueConstraint {
                entity_name,
                constraint_name,
            } => write!(f, "- {} unique {}", entity_name, constraint_name),
            Modification::RenameConstraint {
                entity_name,
                constraint_name,
                new_name,
            } => write!(
                f,
                "~ {} unique {} -> {}",
                entity_name, constraint_name, new_name
            ),
            Modification::AddIndex { entity_name, index } => write!(
                f,
                "+ {} index {} ({})",
                entity_name,
                index.name,
                index.fields.join(", ")
            ),
            Modification::RemoveIndex {
                entity_name,
                index_name,
            } => write!(f, "- {} index {}", entity_name, index_name),
        }
    }
}

// Lookups shared by the kind modules. They return the precondition that
// failed rather than panicking.

fn entity<'a>(schema: &'a Schema, name: &str) -> Result<&'a Entity, Precondition> {
    schema
        .entity(name)
        .ok_or_else(|| Precondition::EntityNotFound(name.to_string()))
}

fn entity_mut<'a>(schema: &'a mut Schema, name: &str) -> Result<&'a mut Entity, Precondition> {
    schema
        .entities
        .get_mut(name)
        .ok_or_else(|| Precondition::EntityNotFound(name.to_string()))
}

fn column<'a>(entity: &'a Entity, field: &str) -> Result<&'a Column, Precondition> {
    match entity.field(field) {
        Some(f) => f.as_column().ok_or_else(|| Precondition::NotAColumn {
            entity: entity.name.clone(),
            field: field.to_string(),
        }),
        None => Err(field_not_found(entity, field)),
    }
}

fn relation<'a>(entity: &'a Entity, field: &str) -> Result<&'a Relation, Precondition> {
    match entity.field(field) {
        Some(f) => f.as_relation().ok_or_else(|| Precondition::NotARelation {
            entity: entity.name.clone(),
            field: field.to_string(),
        }),
        None => Err(field_not_found(entity, field)),
    }
}

fn field_not_found(entity: &Entity, field: &str) -> Precondition {
    Precondition::FieldNotFound {
        entity: entity.name.clone(),
        field: field.to_string(),
    }
}

fn ensure_field_free(entity: &Entity, field: &str) -> Result<(), Precondition> {
    if entity.fields.contains_key(field) {
        return Err(Precondition::FieldAlreadyExists {
            entity: entity.name.clone(),
            field: field.to_string(),
        });
    }
    Ok(())
}

fn ensure_column_free(entity: &Entity, column: &str) -> Result<(), Precondition> {
    if entity
        .fields
        .values()
        .any(|f| f.storage_column() == Some(column))
    {
        return Err(Precondition::ColumnNameTaken {
            entity: entity.name.clone(),
            column: column.to_string(),
        });
    }
    Ok(())
}

/// Tables, join tables, unique constraints and indexes all become Postgres
/// relations, so their names share one namespace across the schema.
fn relation_name_taken(schema: &Schema, name: &str) -> bool {
    schema.entities.values().any(|e| {
        e.table_name == name
            || e.unique.contains_key(name)
            || e.indexes.contains_key(name)
            || e.relations()
                .any(|r| r.join_table().is_some_and(|jt| jt.table_name == name))
    })
}

fn ensure_table_free(schema: &Schema, table: &str) -> Result<(), Precondition> {
    if relation_name_taken(schema, table) {
        return Err(Precondition::TableNameTaken(table.to_string()));
    }
    Ok(())
}

/// Fields used by a unique constraint or index cannot be removed.
fn ensure_unconstrained(entity: &Entity, field: &str) -> Result<(), Precondition> {
    let by = entity
        .unique
        .values()
        .find(|u| u.fields.iter().any(|f| f == field))
        .map(|u| u.name.clone())
        .or_else(|| {
            entity
                .indexes
                .values()
                .find(|i| i.fields.iter().any(|f| f == field))
                .map(|i| i.name.clone())
        });
    match by {
        Some(by) => Err(Precondition::FieldInUse {
            entity: entity.name.clone(),
            field: field.to_string(),
            by,
        }),
        None => Ok(()),
    }
}

/// Replace `from` with `to` in an ordered map, keeping the entry's position.
fn rename_key<V>(map: &mut IndexMap<String, V>, from: &str, to: &str) -> Option<&mut V> {
    let index = map.get_index_of(from)?;
    let value = map.shift_remove(from)?;
    map.shift_insert(index, to.to_string(), value);
    map.get_mut(to)
}
