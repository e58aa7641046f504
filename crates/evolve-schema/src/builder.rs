//! Explicit builders for [`Schema`] values.
//!
//! Every builder method consumes the builder and returns it. Nothing is
//! checked until [`SchemaBuilder::build`], which assembles the schema and
//! validates it once.
//!
//! ```
//! use evolve_schema::{Column, ColumnType, EntityBuilder, OnDelete, RelationBuilder, SchemaBuilder};
//!
//! let schema = SchemaBuilder::new()
//!     .entity(EntityBuilder::new("Post").column(Column::new("title", ColumnType::String)))
//!     .entity(
//!         EntityBuilder::new("Comment")
//!             .column(Column::new("text", ColumnType::String))
//!             .relation(RelationBuilder::many_has_one("post", "Post").on_delete(OnDelete::Cascade)),
//!     )
//!     .build()
//!     .unwrap();
//! assert_eq!(schema.entity("Comment").unwrap().storage_column("post"), Some("post_id"));
//! ```

use crate::validate::{self, SchemaValidationError, Violation};
use crate::{
    Column, ColumnType, Entity, Enum, Field, Index, JoinColumn, JoinTable, Joining, OnDelete,
    Relation, RelationKind, Schema, UniqueConstraint,
};
use evolve_sql::{index_name, snake_case, unique_constraint_name};
use indexmap::IndexMap;

#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    enums: Vec<Enum>,
    entities: Vec<EntityBuilder>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enumeration(mut self, e: Enum) -> Self {
        self.enums.push(e);
        self
    }

    pub fn entity(mut self, entity: EntityBuilder) -> Self {
        self.entities.push(entity);
        self
    }

    /// Assemble and validate the schema.
    pub fn build(self) -> Result<Schema, SchemaValidationError> {
        let mut violations = Vec::new();
        let mut schema = Schema::default();

        for e in self.enums {
            if schema.enums.contains_key(&e.name) {
                violations.push(Violation::new(
                    format!("enums.{}", e.name),
                    "enum declared twice",
                ));
                continue;
            }
            schema.enums.insert(e.name.clone(), e);
        }

        let tables: IndexMap<String, String> = self
            .entities
            .iter()
            .map(|b| (b.name.clone(), b.resolved_table_name()))
            .collect();

        for builder in self.entities {
            if schema.entities.contains_key(&builder.name) {
                violations.push(Violation::new(
                    format!("entities.{}", builder.name),
                    "entity declared twice",
                ));
                continue;
            }
            let entity = builder.finish(&tables, &mut violations);
            schema.entities.insert(entity.name.clone(), entity);
        }

        link_inverses(&mut schema);
        validate::check(&schema, &mut violations);

        if violations.is_empty() {
            Ok(schema)
        } else {
            Err(SchemaValidationError { violations })
        }
    }
}

/// An inverse side names its owner; make the owner name it back if it didn't.
fn link_inverses(schema: &mut Schema) {
    let mut links = Vec::new();
    for entity in schema.entities.values() {
        for rel in entity.relations() {
            if let (None, Some(owner)) = (&rel.joining, &rel.inverse) {
                links.push((rel.target.clone(), owner.clone(), rel.name.clone()));
            }
        }
    }
    for (target, owner, inverse) in links {
        if let Some(Field::Relation(owning)) = schema
            .entities
            .get_mut(&target)
            .and_then(|e| e.fields.get_mut(&owner))
        {
            if owning.is_owning() && owning.inverse.is_none() {
                owning.inverse = Some(inverse);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntityBuilder {
    name: String,
    table_name: Option<String>,
    primary: Option<Column>,
    fields: Vec<PendingField>,
    unique: Vec<(Option<String>, Vec<String>)>,
    indexes: Vec<(Option<String>, Vec<String>)>,
}

#[derive(Debug, Clone)]
enum PendingField {
    Column(Column),
    Relation(RelationBuilder),
}

impl EntityBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            primary: None,
            fields: Vec::new(),
            unique: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Override the storage table name (default: snake_case of the entity name).
    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Replace the default `id: uuid not null` primary key.
    pub fn primary(mut self, column: Column) -> Self {
        self.primary = Some(column.not_null());
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.fields.push(PendingField::Column(column));
        self
    }

    pub fn relation(mut self, relation: RelationBuilder) -> Self {
        self.fields.push(PendingField::Relation(relation));
        self
    }

    /// A unique constraint with a generated name.
    pub fn unique<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique
            .push((None, fields.into_iter().map(Into::into).collect()));
        self
    }

    pub fn named_unique<I, S>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique.push((
            Some(name.into()),
            fields.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// An index with a generated name.
    pub fn index<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes
            .push((None, fields.into_iter().map(Into::into).collect()));
        self
    }

    pub fn named_index<I, S>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push((
            Some(name.into()),
            fields.into_iter().map(Into::into).collect(),
        ));
        self
    }

    fn resolved_table_name(&self) -> String {
        self.table_name
            .clone()
            .unwrap_or_else(|| snake_case(&self.name))
    }

    fn finish(self, tables: &IndexMap<String, String>, v: &mut Vec<Violation>) -> Entity {
        let table_name = self.resolved_table_name();
        let path = format!("entities.{}", self.name);
        let primary = self
            .primary
            .unwrap_or_else(|| Column::new("id", ColumnType::Uuid).not_null());

        let mut fields = IndexMap::new();
        let primary_name = primary.name.clone();
        fields.insert(primary_name.clone(), Field::Column(primary));

        for pending in self.fields {
            let field = match pending {
                PendingField::Column(col) => Field::Column(col),
                PendingField::Relation(rel) => Field::Relation(rel.finish(&table_name, tables)),
            };
            let name = field.name().to_string();
            if fields.contains_key(&name) {
                v.push(Violation::new(
                    format!("{}.fields.{}", path, name),
                    "field declared twice",
                ));
                continue;
            }
            fields.insert(name, field);
        }

        let mut unique = IndexMap::new();
        for (name, field_list) in self.unique {
            let name = name.unwrap_or_else(|| unique_constraint_name(&self.name, &field_list));
            if unique.contains_key(&name) {
                v.push(Violation::new(
                    format!("{}.unique.{}", path, name),
                    "unique constraint declared twice",
                ));
                continue;
            }
            unique.insert(
                name.clone(),
                UniqueConstraint {
                    name,
                    fields: field_list,
                },
            );
        }

        let mut indexes = IndexMap::new();
        for (name, field_list) in self.indexes {
            let name = name.unwrap_or_else(|| index_name(&table_name, &field_list));
            if indexes.contains_key(&name) {
                v.push(Violation::new(
                    format!("{}.indexes.{}", path, name),
                    "index declared twice",
                ));
                continue;
            }
            indexes.insert(
                name.clone(),
                Index {
                    name,
                    fields: field_list,
                },
            );
        }

        Entity {
            name: self.name,
            table_name,
            primary: primary_name,
            fields,
            unique,
            indexes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelationBuilder {
    name: String,
    kind: RelationKind,
    target: String,
    owning: bool,
    inverse: Option<String>,
    on_delete: OnDelete,
    joining_column: Option<String>,
    join_table: Option<String>,
    nullable: bool,
}

impl RelationBuilder {
    fn new(name: impl Into<String>, kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            owning: true,
            inverse: None,
            on_delete: OnDelete::Restrict,
            joining_column: None,
            join_table: None,
            nullable: true,
        }
    }

    /// Many rows of this entity point at one row of `target`, via a foreign key here.
    pub fn many_has_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::ManyHasOne, target)
    }

    /// Inverse side of `target.owned_by`, a ManyHasOne pointing back here.
    pub fn one_has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        owned_by: impl Into<String>,
    ) -> Self {
        let mut b = Self::new(name, RelationKind::OneHasMany, target);
        b.owning = false;
        b.inverse = Some(owned_by.into());
        b
    }

    pub fn one_has_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::OneHasOne, target)
    }

    pub fn one_has_one_inverse(
        name: impl Into<String>,
        target: impl Into<String>,
        owned_by: impl Into<String>,
    ) -> Self {
        let mut b = Self::new(name, RelationKind::OneHasOne, target);
        b.owning = false;
        b.inverse = Some(owned_by.into());
        b
    }

    /// Owning side of a many-to-many relation, stored in a junction table.
    pub fn many_has_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::ManyHasMany, target)
    }

    pub fn many_has_many_inverse(
        name: impl Into<String>,
        target: impl Into<String>,
        owned_by: impl Into<String>,
    ) -> Self {
        let mut b = Self::new(name, RelationKind::ManyHasMany, target);
        b.owning = false;
        b.inverse = Some(owned_by.into());
        b
    }

    pub fn on_delete(mut self, on_delete: OnDelete) -> Self {
        self.on_delete = on_delete;
        self
    }

    /// Name the partner field on the target entity.
    pub fn inversed_by(mut self, field: impl Into<String>) -> Self {
        self.inverse = Some(field.into());
        self
    }

    pub fn joining_column(mut self, column: impl Into<String>) -> Self {
        self.joining_column = Some(column.into());
        self
    }

    pub fn join_table(mut self, table: impl Into<String>) -> Self {
        self.join_table = Some(table.into());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    fn finish(self, table_name: &str, tables: &IndexMap<String, String>) -> Relation {
        let joining = if !self.owning {
            None
        } else if self.kind == RelationKind::ManyHasMany {
            let target_table = tables
                .get(&self.target)
                .cloned()
                .unwrap_or_else(|| snake_case(&self.target));
            let mut join_column = format!("{}_id", table_name);
            let mut inverse_join_column = format!("{}_id", target_table);
            if join_column == inverse_join_column {
                join_column = format!("source_{}", join_column);
                inverse_join_column = format!("target_{}", inverse_join_column);
            }
            Some(Joining::Table(JoinTable {
                table_name: self
                    .join_table
                    .unwrap_or_else(|| format!("{}_{}", table_name, snake_case(&self.name))),
                join_column,
                inverse_join_column,
            }))
        } else {
            Some(Joining::Column(JoinColumn {
                column_name: self
                    .joining_column
                    .unwrap_or_else(|| format!("{}_id", snake_case(&self.name))),
                on_delete: self.on_delete,
            }))
        };

        Relation {
            name: self.name,
            kind: self.kind,
            target: self.target,
            joining,
            inverse: self.inverse,
            nullable: self.nullable,
        }
    }
}
