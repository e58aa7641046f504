//! Content hashing.
//!
//! The hash covers everything that ends up in the database and nothing else:
//! map order is irrelevant (keys are sorted), while the order of constraint
//! field lists and enum values is significant. Every string is length-prefixed
//! so adjacent values can't run together.

use crate::{Column, ColumnType, Entity, Field, Joining, Relation, Schema};
use facet::Facet;
use indexmap::IndexMap;
use std::fmt;

/// Hex-encoded blake3 digest of a schema's content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
#[facet(transparent)]
pub struct SchemaHash(pub String);

impl SchemaHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Schema {
    /// Content hash used to detect drift between recorded and expected state.
    pub fn content_hash(&self) -> SchemaHash {
        let mut canon = Canon::default();
        canon.tag(b"schema");
        canon.sorted(&self.enums, |c, e| {
            c.str(&e.name);
            c.list(&e.values);
        });
        canon.sorted(&self.entities, |c, entity| c.entity(entity));
        SchemaHash(canon.hasher.finalize().to_hex().to_string())
    }
}

#[derive(Default)]
struct Canon {
    hasher: blake3::Hasher,
}

impl Canon {
    fn tag(&mut self, tag: &[u8]) {
        self.hasher.update(&[tag.len() as u8]);
        self.hasher.update(tag);
    }

    fn str(&mut self, s: &str) {
        self.hasher.update(&(s.len() as u64).to_le_bytes());
        self.hasher.update(s.as_bytes());
    }

    fn opt(&mut self, s: Option<&str>) {
        match s {
            Some(s) => {
                self.tag(b"some");
                self.str(s);
            }
            None => self.tag(b"none"),
        }
    }

    fn bool(&mut self, b: bool) {
        self.hasher.update(&[b as u8]);
    }

    fn list(&mut self, items: &[String]) {
        self.hasher.update(&(items.len() as u64).to_le_bytes());
        for item in items {
            self.str(item);
        }
    }

    fn sorted<T>(&mut self, map: &IndexMap<String, T>, mut each: impl FnMut(&mut Self, &T)) {
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();
        self.hasher.update(&(keys.len() as u64).to_le_bytes());
        for key in keys {
            self.str(key);
            if let Some(value) = map.get(key) {
                each(self, value);
            }
        }
    }

    fn entity(&mut self, entity: &Entity) {
        self.str(&entity.name);
        self.str(&entity.table_name);
        self.str(&entity.primary);
        self.sorted(&entity.fields, |c, field| match field {
            Field::Column(col) => c.column(col),
            Field::Relation(rel) => c.relation(rel),
        });
        self.sorted(&entity.unique, |c, u| {
            c.str(&u.name);
            c.list(&u.fields);
        });
        self.sorted(&entity.indexes, |c, i| {
            c.str(&i.name);
            c.list(&i.fields);
        });
    }

    fn column(&mut self, col: &Column) {
        self.tag(b"column");
        self.str(&col.name);
        self.str(&col.column_name);
        match &col.column_type {
            ColumnType::Enum(name) => {
                self.tag(b"enum");
                self.str(name);
            }
            other => self.tag(other.to_string().as_bytes()),
        }
        self.bool(col.nullable);
        self.opt(col.default.as_deref());
    }

    fn relation(&mut self, rel: &Relation) {
        self.tag(b"relation");
        self.str(&rel.name);
        self.tag(rel.kind.to_string().as_bytes());
        self.str(&rel.target);
        match &rel.joining {
            Some(Joining::Column(jc)) => {
                self.tag(b"join-column");
                self.str(&jc.column_name);
                self.tag(jc.on_delete.to_string().as_bytes());
            }
            Some(Joining::Table(jt)) => {
                self.tag(b"join-table");
                self.str(&jt.table_name);
                self.str(&jt.join_column);
                self.str(&jt.inverse_join_column);
            }
            None => self.tag(b"inverse-side"),
        }
        self.opt(rel.inverse.as_deref());
        self.bool(rel.nullable);
    }
}
