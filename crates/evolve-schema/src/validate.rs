use crate::{Entity, Field, Joining, OnDelete, Relation, RelationKind, Schema};
use evolve_sql::foreign_key_name;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// One broken invariant, with a dotted path to where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A schema broke one or more invariants. Every violation found is listed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid schema ({} violation(s)):\n{}", .violations.len(), render(.violations))]
pub struct SchemaValidationError {
    pub violations: Vec<Violation>,
}

fn render(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn validate(schema: &Schema) -> Result<(), SchemaValidationError> {
    let mut v = Vec::new();
    check(schema, &mut v);
    if v.is_empty() {
        Ok(())
    } else {
        Err(SchemaValidationError { violations: v })
    }
}

pub(crate) fn check(schema: &Schema, v: &mut Vec<Violation>) {
    for (key, e) in &schema.enums {
        let path = format!("enums.{}", key);
        if *key != e.name {
            v.push(Violation::new(&path, format!("key does not match name `{}`", e.name)));
        }
        if e.values.is_empty() {
            v.push(Violation::new(&path, "enum has no values"));
        }
        let mut seen = HashSet::new();
        for value in &e.values {
            if !seen.insert(value) {
                v.push(Violation::new(&path, format!("duplicate value `{}`", value)));
            }
        }
    }

    // Generated names, owned here so the claims below can borrow them.
    let domains: Vec<(String, String)> = schema
        .enums
        .iter()
        .map(|(key, e)| (e.domain_name(), format!("enums.{}", key)))
        .collect();
    let foreign_keys = foreign_key_names(schema);

    // Table names, constraint names and index names all live in one Postgres
    // namespace per schema.
    let mut tables: HashMap<&str, String> = HashMap::new();
    let mut relnames: HashMap<&str, String> = HashMap::new();
    // Domains are types, as is the row type of every table.
    let mut types: HashMap<&str, String> = HashMap::new();
    for (domain, path) in &domains {
        claim(&mut types, domain, path, "domain", v);
    }

    for (key, entity) in &schema.entities {
        let path = format!("entities.{}", key);
        if *key != entity.name {
            v.push(Violation::new(
                &path,
                format!("key does not match name `{}`", entity.name),
            ));
        }
        claim(&mut tables, &entity.table_name, &path, "table", v);

        match entity.field(&entity.primary) {
            Some(Field::Column(col)) if !col.nullable => {}
            Some(Field::Column(_)) => v.push(Violation::new(
                &path,
                format!("primary field `{}` must not be nullable", entity.primary),
            )),
            Some(Field::Relation(_)) => v.push(Violation::new(
                &path,
                format!("primary field `{}` must be a column", entity.primary),
            )),
            None => v.push(Violation::new(
                &path,
                format!("primary field `{}` does not exist", entity.primary),
            )),
        }

        let mut storage: HashMap<&str, &str> = HashMap::new();
        for (fkey, field) in &entity.fields {
            let fpath = format!("{}.fields.{}", path, fkey);
            if fkey != field.name() {
                v.push(Violation::new(
                    &fpath,
                    format!("key does not match name `{}`", field.name()),
                ));
            }
            if let Some(column) = field.storage_column() {
                if let Some(other) = storage.insert(column, field.name()) {
                    v.push(Violation::new(
                        &fpath,
                        format!("column `{}` is already used by field `{}`", column, other),
                    ));
                }
            }
            match field {
                Field::Column(col) => {
                    if let crate::ColumnType::Enum(name) = &col.column_type {
                        if schema.enumeration(name).is_none() {
                            v.push(Violation::new(&fpath, format!("unknown enum `{}`", name)));
                        }
                    }
                }
                Field::Relation(rel) => {
                    if let Some(jt) = rel.join_table() {
                        claim(&mut tables, &jt.table_name, &fpath, "table", v);
                    }
                    check_relation(schema, entity, rel, &fpath, v);
                }
            }
        }

        let mut field_lists = HashSet::new();
        for (ukey, u) in &entity.unique {
            let upath = format!("{}.unique.{}", path, ukey);
            if *ukey != u.name {
                v.push(Violation::new(&upath, format!("key does not match name `{}`", u.name)));
            }
            claim(&mut relnames, &u.name, &upath, "constraint", v);
            check_field_list(entity, &u.fields, &upath, v);
            if !field_lists.insert(&u.fields) {
                v.push(Violation::new(
                    &upath,
                    format!("another unique constraint covers ({})", u.fields.join(", ")),
                ));
            }
        }
        for (ikey, i) in &entity.indexes {
            let ipath = format!("{}.indexes.{}", path, ikey);
            if *ikey != i.name {
                v.push(Violation::new(&ipath, format!("key does not match name `{}`", i.name)));
            }
            claim(&mut relnames, &i.name, &ipath, "index", v);
            check_field_list(entity, &i.fields, &ipath, v);
        }
    }

    for (name, path) in &foreign_keys {
        claim(&mut relnames, name, path, "foreign key", v);
    }

    // Tables are relations too.
    for (table, path) in &tables {
        if let Some(other) = relnames.get(table) {
            v.push(Violation::new(
                other,
                format!("name `{}` is already used by table at {}", table, path),
            ));
        }
        if let Some(other) = types.get(table) {
            v.push(Violation::new(
                other,
                format!("domain `{}` clashes with the row type of table at {}", table, path),
            ));
        }
    }
}

/// Names of the foreign keys the DDL creates, with the field each belongs to.
fn foreign_key_names(schema: &Schema) -> Vec<(String, String)> {
    let mut names = Vec::new();
    for (key, entity) in &schema.entities {
        for rel in entity.relations() {
            let path = format!("entities.{}.fields.{}", key, rel.name);
            if let Some(jc) = rel.join_column() {
                names.push((foreign_key_name(&entity.table_name, &jc.column_name), path.clone()));
            }
            if let Some(jt) = rel.join_table() {
                names.push((foreign_key_name(&jt.table_name, &jt.join_column), path.clone()));
                names.push((foreign_key_name(&jt.table_name, &jt.inverse_join_column), path));
            }
        }
    }
    names
}

fn claim<'a>(
    seen: &mut HashMap<&'a str, String>,
    name: &'a str,
    path: &str,
    what: &str,
    v: &mut Vec<Violation>,
) {
    if let Some(previous) = seen.insert(name, path.to_string()) {
        v.push(Violation::new(
            path,
            format!("{} name `{}` is already used at {}", what, name, previous),
        ));
    }
}

fn check_field_list(entity: &Entity, fields: &[String], path: &str, v: &mut Vec<Violation>) {
    if fields.is_empty() {
        v.push(Violation::new(path, "no fields"));
    }
    for field in fields {
        match entity.field(field) {
            None => v.push(Violation::new(path, format!("field `{}` does not exist", field))),
            Some(f) if f.storage_column().is_none() => v.push(Violation::new(
                path,
                format!("field `{}` has no column on `{}`", field, entity.table_name),
            )),
            Some(_) => {}
        }
    }
}

fn check_relation(
    schema: &Schema,
    entity: &Entity,
    rel: &Relation,
    path: &str,
    v: &mut Vec<Violation>,
) {
    let shape_ok = match (rel.kind, &rel.joining) {
        (RelationKind::ManyHasOne, Some(Joining::Column(_))) => true,
        (RelationKind::OneHasMany, None) => true,
        (RelationKind::OneHasOne, Some(Joining::Column(_)) | None) => true,
        (RelationKind::ManyHasMany, Some(Joining::Table(_)) | None) => true,
        _ => false,
    };
    if !shape_ok {
        v.push(Violation::new(
            path,
            format!("{} relation cannot be stored this way", rel.kind),
        ));
    }
    if !rel.is_owning() && rel.inverse.is_none() {
        v.push(Violation::new(path, "inverse side must name its owning field"));
    }
    if let Some(jc) = rel.join_column() {
        if jc.on_delete == OnDelete::SetNull && !rel.nullable {
            v.push(Violation::new(path, "on delete setNull requires a nullable relation"));
        }
    }

    let Some(target) = schema.entity(&rel.target) else {
        v.push(Violation::new(path, format!("target `{}` does not exist", rel.target)));
        return;
    };
    let Some(inverse) = &rel.inverse else {
        return;
    };
    let partner = match target.field(inverse) {
        Some(Field::Relation(partner)) => partner,
        Some(Field::Column(_)) => {
            v.push(Violation::new(
                path,
                format!("inverse `{}.{}` is not a relation", target.name, inverse),
            ));
            return;
        }
        None => {
            v.push(Violation::new(
                path,
                format!("inverse `{}.{}` does not exist", target.name, inverse),
            ));
            return;
        }
    };
    if partner.target != entity.name || partner.inverse.as_deref() != Some(rel.name.as_str()) {
        v.push(Violation::new(
            path,
            format!("inverse `{}.{}` does not point back", target.name, inverse),
        ));
    }
    if partner.kind != rel.kind.complement() {
        v.push(Violation::new(
            path,
            format!(
                "inverse `{}.{}` is {}, expected {}",
                target.name,
                inverse,
                partner.kind,
                rel.kind.complement()
            ),
        ));
    }
    if partner.is_owning() == rel.is_owning() {
        v.push(Violation::new(
            path,
            format!("exactly one of `{}` and `{}.{}` must own the relation", rel.name, target.name, inverse),
        ));
    }
}
