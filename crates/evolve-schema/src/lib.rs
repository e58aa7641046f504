//! Schema model for evolve.
//!
//! A [`Schema`] is a plain value: entities are stored once, by name, and
//! relations point at their target by name. Nothing in here talks to a
//! database. Values are assembled with the builders in [`builder`] and checked
//! once by [`Schema::validate`].

use evolve_sql::{quote_ident, snake_case};
use facet::Facet;
use indexmap::IndexMap;
use std::fmt;

mod builder;
mod hash;
mod validate;

pub use builder::{EntityBuilder, RelationBuilder, SchemaBuilder};
pub use hash::SchemaHash;
pub use validate::{SchemaValidationError, Violation};

/// A complete schema: named enums plus entities keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Facet)]
pub struct Schema {
    #[facet(default)]
    pub enums: IndexMap<String, Enum>,
    #[facet(default)]
    pub entities: IndexMap<String, Entity>,
}

/// A named set of allowed text values. Stored as a Postgres domain.
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct Enum {
    pub name: String,
    pub values: Vec<String>,
}

/// A named structural type, stored in one table.
#[derive(Debug, Clone, PartialEq, Facet)]
#[facet(rename_all = "camelCase")]
pub struct Entity {
    pub name: String,
    pub table_name: String,
    /// Name of the primary key field (always a non-nullable column).
    pub primary: String,
    #[facet(default)]
    pub fields: IndexMap<String, Field>,
    #[facet(default)]
    pub unique: IndexMap<String, UniqueConstraint>,
    #[facet(default)]
    pub indexes: IndexMap<String, Index>,
}

/// A field is either a scalar column or a relation to another entity.
#[derive(Debug, Clone, PartialEq, Facet)]
#[facet(rename_all = "camelCase")]
#[repr(u8)]
pub enum Field {
    Column(Column),
    Relation(Relation),
}

/// A scalar column.
#[derive(Debug, Clone, PartialEq, Facet)]
#[facet(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    pub column_name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    /// Default value expression, used verbatim in DDL.
    #[facet(default)]
    pub default: Option<String>,
}

/// Scalar column types.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[facet(rename_all = "camelCase")]
#[repr(u8)]
pub enum ColumnType {
    Uuid,
    String,
    Int,
    Double,
    Bool,
    DateTime,
    Date,
    Json,
    /// Text restricted to the values of a named [`Enum`].
    Enum(String),
}

/// A relation from one entity to another.
#[derive(Debug, Clone, PartialEq, Facet)]
#[facet(rename_all = "camelCase")]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    /// Name of the target entity.
    pub target: String,
    /// How the relation is stored. `None` marks the inverse (non-owning) side.
    #[facet(default)]
    pub joining: Option<Joining>,
    /// Name of the partner field on the target entity, if the relation is bidirectional.
    #[facet(default)]
    pub inverse: Option<String>,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[facet(rename_all = "camelCase")]
#[repr(u8)]
pub enum RelationKind {
    OneHasMany,
    ManyHasOne,
    OneHasOne,
    ManyHasMany,
}

/// Storage of an owning relation.
#[derive(Debug, Clone, PartialEq, Facet)]
#[facet(rename_all = "camelCase")]
#[repr(u8)]
pub enum Joining {
    /// A foreign key column on the owning entity's table.
    Column(JoinColumn),
    /// A junction table (ManyHasMany).
    Table(JoinTable),
}

#[derive(Debug, Clone, PartialEq, Facet)]
#[facet(rename_all = "camelCase")]
pub struct JoinColumn {
    pub column_name: String,
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone, PartialEq, Facet)]
#[facet(rename_all = "camelCase")]
pub struct JoinTable {
    pub table_name: String,
    /// Column pointing at the owning entity.
    pub join_column: String,
    /// Column pointing at the target entity.
    pub inverse_join_column: String,
}

/// Referential action when the referenced row is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Facet)]
#[facet(rename_all = "camelCase")]
#[repr(u8)]
pub enum OnDelete {
    #[default]
    Restrict,
    Cascade,
    SetNull,
}

/// A unique constraint over an ordered list of fields.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct UniqueConstraint {
    pub name: String,
    pub fields: Vec<String>,
}

/// A non-unique index over an ordered list of fields.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Index {
    pub name: String,
    pub fields: Vec<String>,
}

impl Schema {
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    pub fn enumeration(&self, name: &str) -> Option<&Enum> {
        self.enums.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.enums.is_empty() && self.entities.is_empty()
    }

    /// Check every structural invariant, reporting all violations at once.
    pub fn validate(&self) -> Result<(), SchemaValidationError> {
        validate::validate(self)
    }

    /// Relations on other entities that target `entity`.
    pub fn relations_targeting<'a>(
        &'a self,
        entity: &'a str,
    ) -> impl Iterator<Item = (&'a Entity, &'a Relation)> + 'a {
        self.entities.values().flat_map(move |e| {
            e.relations()
                .filter(move |r| r.target == entity)
                .map(move |r| (e, r))
        })
    }

    /// SQL type of the columns that reference `entity`'s primary key.
    pub fn key_sql_type(&self, entity: &str) -> Option<String> {
        let target = self.entity(entity)?;
        Some(target.primary_column()?.column_type.sql_type())
    }

    /// Storage column holding `entity`'s primary key.
    pub fn key_column_name(&self, entity: &str) -> Option<&str> {
        let target = self.entity(entity)?;
        Some(target.primary_column()?.column_name.as_str())
    }
}

impl Enum {
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Name of the Postgres domain backing this enum.
    pub fn domain_name(&self) -> String {
        snake_case(&self.name)
    }
}

impl Entity {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        match self.fields.get(name)? {
            Field::Column(col) => Some(col),
            Field::Relation(_) => None,
        }
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        match self.fields.get(name)? {
            Field::Relation(rel) => Some(rel),
            Field::Column(_) => None,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.fields.values().filter_map(|f| match f {
            Field::Column(col) => Some(col),
            Field::Relation(_) => None,
        })
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.fields.values().filter_map(|f| match f {
            Field::Relation(rel) => Some(rel),
            Field::Column(_) => None,
        })
    }

    pub fn primary_column(&self) -> Option<&Column> {
        self.column(&self.primary)
    }

    /// The column on this entity's table that stores `field`, if any.
    ///
    /// Inverse relations and junction-table relations have no column here.
    pub fn storage_column(&self, field: &str) -> Option<&str> {
        self.fields.get(field)?.storage_column()
    }
}

impl Field {
    pub fn name(&self) -> &str {
        match self {
            Field::Column(col) => &col.name,
            Field::Relation(rel) => &rel.name,
        }
    }

    pub fn storage_column(&self) -> Option<&str> {
        match self {
            Field::Column(col) => Some(&col.column_name),
            Field::Relation(rel) => rel.join_column().map(|j| j.column_name.as_str()),
        }
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            Field::Column(col) => Some(col),
            Field::Relation(_) => None,
        }
    }

    pub fn as_relation(&self) -> Option<&Relation> {
        match self {
            Field::Relation(rel) => Some(rel),
            Field::Column(_) => None,
        }
    }

    /// Rename the field, keeping its storage.
    pub fn set_name(&mut self, name: impl Into<String>) {
        match self {
            Field::Column(col) => col.name = name.into(),
            Field::Relation(rel) => rel.name = name.into(),
        }
    }
}

impl Column {
    /// A nullable column whose storage name is the snake_case field name.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        let name = name.into();
        Self {
            column_name: snake_case(&name),
            name,
            column_type,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn column_name(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = column_name.into();
        self
    }

    /// Same type, nullability and default (names are not compared).
    pub fn same_definition(&self, other: &Column) -> bool {
        self.column_type == other.column_type
            && self.nullable == other.nullable
            && self.default == other.default
    }
}

impl ColumnType {
    /// Postgres type used for columns of this type.
    pub fn sql_type(&self) -> String {
        match self {
            ColumnType::Uuid => "uuid".to_string(),
            ColumnType::String => "text".to_string(),
            ColumnType::Int => "integer".to_string(),
            ColumnType::Double => "double precision".to_string(),
            ColumnType::Bool => "boolean".to_string(),
            ColumnType::DateTime => "timestamptz".to_string(),
            ColumnType::Date => "date".to_string(),
            ColumnType::Json => "jsonb".to_string(),
            ColumnType::Enum(name) => quote_ident(&snake_case(name)),
        }
    }
}

impl Relation {
    /// Whether this side stores the relation.
    pub fn is_owning(&self) -> bool {
        self.joining.is_some()
    }

    pub fn join_column(&self) -> Option<&JoinColumn> {
        match &self.joining {
            Some(Joining::Column(jc)) => Some(jc),
            _ => None,
        }
    }

    pub fn join_table(&self) -> Option<&JoinTable> {
        match &self.joining {
            Some(Joining::Table(jt)) => Some(jt),
            _ => None,
        }
    }
}

impl RelationKind {
    /// The kind the partner field must have.
    pub fn complement(self) -> RelationKind {
        match self {
            RelationKind::OneHasMany => RelationKind::ManyHasOne,
            RelationKind::ManyHasOne => RelationKind::OneHasMany,
            RelationKind::OneHasOne => RelationKind::OneHasOne,
            RelationKind::ManyHasMany => RelationKind::ManyHasMany,
        }
    }
}

impl OnDelete {
    pub fn to_action(self) -> evolve_sql::ReferentialAction {
        match self {
            OnDelete::Restrict => evolve_sql::ReferentialAction::Restrict,
            OnDelete::Cascade => evolve_sql::ReferentialAction::Cascade,
            OnDelete::SetNull => evolve_sql::ReferentialAction::SetNull,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Uuid => write!(f, "uuid"),
            ColumnType::String => write!(f, "string"),
            ColumnType::Int => write!(f, "int"),
            ColumnType::Double => write!(f, "double"),
            ColumnType::Bool => write!(f, "bool"),
            ColumnType::DateTime => write!(f, "dateTime"),
            ColumnType::Date => write!(f, "date"),
            ColumnType::Json => write!(f, "json"),
            ColumnType::Enum(name) => write!(f, "enum {}", name),
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::OneHasMany => write!(f, "oneHasMany"),
            RelationKind::ManyHasOne => write!(f, "manyHasOne"),
            RelationKind::OneHasOne => write!(f, "oneHasOne"),
            RelationKind::ManyHasMany => write!(f, "manyHasMany"),
        }
    }
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnDelete::Restrict => write!(f, "restrict"),
            OnDelete::Cascade => write!(f, "cascade"),
            OnDelete::SetNull => write!(f, "setNull"),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.column_type)?;
        if !self.nullable {
            write!(f, " not null")?;
        }
        if let Some(default) = &self.default {
            write!(f, " default {}", default)?;
        }
        Ok(())
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.name, self.kind, self.target)?;
        if let Some(jc) = self.join_column() {
            write!(f, " via {} on delete {}", jc.column_name, jc.on_delete)?;
        }
        if let Some(jt) = self.join_table() {
            write!(f, " via {}", jt.table_name)?;
        }
        if let Some(inverse) = &self.inverse {
            write!(f, " inverse {}", inverse)?;
        }
        Ok(())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Column(col) => col.fmt(f),
            Field::Relation(rel) => rel.fmt(f),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in self.enums.values() {
            writeln!(f, "enum {} {{ {} }}", e.name, e.values.join(", "))?;
        }
        for entity in self.entities.values() {
            writeln!(f, "entity {} ({}) {{", entity.name, entity.table_name)?;
            for field in entity.fields.values() {
                let marker = if field.name() == entity.primary {
                    " [pk]"
                } else {
                    ""
                };
                writeln!(f, "    {}{}", field, marker)?;
            }
            for u in entity.unique.values() {
                writeln!(f, "    unique {} ({})", u.name, u.fields.join(", "))?;
            }
            for i in entity.indexes.values() {
                writeln!(f, "    index {} ({})", i.name, i.fields.join(", "))?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
