//! Schema diffing: the modifications taking one [`Schema`] to another.
//!
//! The output is deterministic and context-free: every modification's
//! precondition holds at its position, so folding the list over the old
//! schema yields a schema equal to the new one.
//!
//! ## Order
//!
//! Modifications come out in fixed buckets:
//!
//! 1. Created and updated enums.
//! 2. Removals: unique constraints and indexes, then relations, then
//!    columns, then entities (referencing entities first).
//! 3. Table and constraint renames, ordered together since both are
//!    relation names in Postgres.
//! 4. Created entities, with their scalar columns.
//! 5. Field renames, storage column renames, column updates, new columns.
//! 6. New relations, then on-delete, nullability and inverse changes.
//! 7. New unique constraints, new indexes.
//! 8. Removed enums.
//!
//! ## Renames
//!
//! Entities are matched by name. Fields are matched by name, or through an
//! explicit [`RenameHints`] entry. Unique constraints are matched by their
//! (renamed) field list, so a constraint whose name alone changed becomes a
//! `renameConstraint`.
//!
//! When renames form a cycle (`a -> b`, `b -> a`), table and column renames go
//! through a temporary name first; a cycle of constraint renames alone falls
//! back to a drop and re-create.
//!
//! An entity whose primary key changed, or that no longer exists, is dropped
//! (and re-created if it is still in the new schema). Every relation pointing
//! at it is dropped and re-added along with it.

use crate::modification::Modification;
use crate::solver::{OnCycle, ReferenceGraph, Rename, sequence_renames};
use evolve_schema::{Column, Entity, Field, Index, Joining, Relation, Schema, UniqueConstraint};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Field renames to apply instead of a drop and add.
///
/// ```
/// use evolve::RenameHints;
///
/// let hints = RenameHints::new().field("Post", "title", "headline");
/// assert_eq!(hints.fields().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameHints {
    fields: Vec<FieldRename>,
}

/// `entity.from` in the old schema is `entity.to` in the new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRename {
    pub entity: String,
    pub from: String,
    pub to: String,
}

impl RenameHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(
        mut self,
        entity: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.fields.push(FieldRename {
            entity: entity.into(),
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn fields(&self) -> &[FieldRename] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Modifications taking `old` to `new`. Empty when they are equal.
pub fn diff(old: &Schema, new: &Schema) -> Vec<Modification> {
    diff_with_hints(old, new, &RenameHints::default())
}

/// Like [`diff`], turning hinted field pairs into renames.
///
/// A hint is ignored (with a warning) when either side is missing, when the
/// old name survives in the new schema or the new name already existed, or
/// when it pairs a column with a relation.
pub fn diff_with_hints(old: &Schema, new: &Schema, hints: &RenameHints) -> Vec<Modification> {
    let differ = Differ::new(old, new, hints);
    let out = differ.run();
    debug!(modifications = out.len(), "diffed schemas");
    out
}

/// Storage column renames on one entity, keyed by the field owning the column.
#[derive(Debug, Clone)]
enum StorageOwner {
    Column(String),
    Relation(String),
}

/// What a relation-namespace rename applies to, keyed by entity.
#[derive(Debug, Clone)]
enum Renamed {
    Table(String),
    Constraint(String),
}

#[derive(Debug, Default)]
struct ConstraintPlan {
    remove_unique: Vec<(String, String)>,
    remove_index: Vec<(String, String)>,
    renames: Vec<Rename<String>>,
    add_unique: Vec<(String, UniqueConstraint)>,
    add_index: Vec<(String, Index)>,
}

struct Differ<'a> {
    old: &'a Schema,
    new: &'a Schema,
    /// Per entity: old field name -> new field name.
    aliases: HashMap<&'a str, IndexMap<&'a str, &'a str>>,
    /// Old entities that are dropped, whether or not they come back.
    dropped: HashSet<&'a str>,
    out: Vec<Modification>,
}

impl<'a> Differ<'a> {
    fn new(old: &'a Schema, new: &'a Schema, hints: &RenameHints) -> Self {
        let mut differ = Differ {
            old,
            new,
            aliases: accept_hints(old, new, hints),
            dropped: HashSet::new(),
            out: Vec::new(),
        };
        for (name, o) in &old.entities {
            let keep = new.entity(name).is_some_and(|n| differ.same_primary(o, n));
            if !keep {
                differ.dropped.insert(name.as_str());
            }
        }
        // A relation rename only stands if the relation itself is kept.
        let mut aliases = std::mem::take(&mut differ.aliases);
        for (entity, map) in aliases.iter_mut() {
            let kept = differ.is_kept(entity);
            map.retain(|from, to| {
                kept && match differ.field_pair(entity, from, to) {
                    Some((Field::Relation(a), Field::Relation(b))) => differ.compatible(a, b),
                    Some((Field::Column(_), Field::Column(_))) => true,
                    _ => false,
                }
            });
        }
        differ.aliases = aliases;
        differ
    }

    fn run(mut self) -> Vec<Modification> {
        let mut constraints = self.plan_constraints();
        self.enums_before();
        self.removals(&constraints);
        self.renames(std::mem::take(&mut constraints.renames));
        self.creations();
        let new = self.new;
        for n in new.entities.values() {
            if let Some(o) = self.kept_old(&n.name) {
                self.field_changes(o, n);
            }
        }
        self.relation_changes();
        self.constraint_additions(constraints);
        self.enums_after();
        self.out
    }

    // -- matching --------------------------------------------------------

    fn field_pair(&self, entity: &str, from: &str, to: &str) -> Option<(&'a Field, &'a Field)> {
        let o = self.old.entity(entity)?.field(from)?;
        let n = self.new.entity(entity)?.field(to)?;
        Some((o, n))
    }

    /// Name of old field `field` of `entity` in the new schema.
    fn alias(&self, entity: &str, field: &'a str) -> &'a str {
        self.aliases
            .get(entity)
            .and_then(|map| map.get(field).copied())
            .unwrap_or(field)
    }

    fn same_primary(&self, o: &'a Entity, n: &Entity) -> bool {
        let (Some(op), Some(np)) = (o.primary_column(), n.primary_column()) else {
            return false;
        };
        self.alias(&o.name, &o.primary) == n.primary && op.column_type == np.column_type
    }

    fn is_kept(&self, entity: &str) -> bool {
        self.old.entities.contains_key(entity)
            && self.new.entities.contains_key(entity)
            && !self.dropped.contains(entity)
    }

    fn kept_old(&self, entity: &str) -> Option<&'a Entity> {
        if self.is_kept(entity) {
            self.old.entity(entity)
        } else {
            None
        }
    }

    /// Same kind, target and storage shape, and the target survives.
    fn compatible(&self, a: &Relation, b: &Relation) -> bool {
        let same_shape = match (&a.joining, &b.joining) {
            (None, None) => true,
            (Some(Joining::Column(_)), Some(Joining::Column(_))) => true,
            (Some(Joining::Table(x)), Some(Joining::Table(y))) => x == y,
            _ => false,
        };
        same_shape
            && a.kind == b.kind
            && a.target == b.target
            && !self.dropped.contains(a.target.as_str())
    }

    fn kept_column(&self, o: &'a Entity, col: &'a Column) -> Option<&'a Column> {
        if !self.is_kept(&o.name) {
            return None;
        }
        self.new
            .entity(&o.name)?
            .column(self.alias(&o.name, &col.name))
    }

    fn kept_relation(&self, o: &'a Entity, rel: &'a Relation) -> Option<&'a Relation> {
        if !self.is_kept(&o.name) {
            return None;
        }
        let n = self
            .new
            .entity(&o.name)?
            .relation(self.alias(&o.name, &rel.name))?;
        self.compatible(rel, n).then_some(n)
    }

    fn kept_field(&self, o: &'a Entity, field: &'a Field) -> bool {
        match field {
            Field::Column(col) => self.kept_column(o, col).is_some(),
            Field::Relation(rel) => self.kept_relation(o, rel).is_some(),
        }
    }

    /// The field list of a constraint after renames, if every field is kept.
    fn mapped_fields(&self, o: &'a Entity, fields: &'a [String]) -> Option<Vec<String>> {
        fields
            .iter()
            .map(|f| {
                let field = o.field(f)?;
                self.kept_field(o, field)
                    .then(|| self.alias(&o.name, f).to_string())
            })
            .collect()
    }

    fn plan_constraints(&self) -> ConstraintPlan {
        let mut plan = ConstraintPlan::default();
        let mut matched: HashSet<(String, String)> = HashSet::new();
        let mut kept_indexes: HashSet<(String, String)> = HashSet::new();

        for o in self.old.entities.values() {
            let n = self.kept_old(&o.name).and_then(|_| self.new.entity(&o.name));
            for u in o.unique.values() {
                let target = n.and_then(|n| {
                    let fields = self.mapped_fields(o, &u.fields)?;
                    n.unique.values().find(|c| c.fields == fields)
                });
                match target {
                    Some(c) => {
                        matched.insert((o.name.clone(), c.name.clone()));
                        if c.name != u.name {
                            plan.renames.push(Rename {
                                key: o.name.clone(),
                                from: u.name.clone(),
                                to: c.name.clone(),
                            });
                        }
                    }
                    None => plan.remove_unique.push((o.name.clone(), u.name.clone())),
                }
            }
            for i in o.indexes.values() {
                let kept = n.and_then(|n| n.indexes.get(&i.name)).is_some_and(|ni| {
                    self.mapped_fields(o, &i.fields).as_ref() == Some(&ni.fields)
                });
                if kept {
                    kept_indexes.insert((o.name.clone(), i.name.clone()));
                } else {
                    plan.remove_index.push((o.name.clone(), i.name.clone()));
                }
            }
        }

        let (renames, fallback) = sequence_renames(std::mem::take(&mut plan.renames), OnCycle::Fallback);
        for r in fallback {
            debug!(entity = %r.key, from = %r.from, to = %r.to, "constraint rename cycle, re-creating");
            matched.remove(&(r.key.clone(), r.to.clone()));
            plan.remove_unique.push((r.key, r.from));
        }
        plan.renames = renames;

        for n in self.new.entities.values() {
            for u in n.unique.values() {
                if !matched.contains(&(n.name.clone(), u.name.clone())) {
                    plan.add_unique.push((n.name.clone(), u.clone()));
                }
            }
            for i in n.indexes.values() {
                if !kept_indexes.contains(&(n.name.clone(), i.name.clone())) {
                    plan.add_index.push((n.name.clone(), i.clone()));
                }
            }
        }
        plan
    }

    // -- buckets ---------------------------------------------------------

    fn enums_before(&mut self) {
        for e in self.new.enums.values() {
            match self.old.enumeration(&e.name) {
                None => self.out.push(Modification::CreateEnum {
                    enum_name: e.name.clone(),
                    values: e.values.clone(),
                }),
                Some(o) if o.values != e.values => self.out.push(Modification::UpdateEnum {
                    enum_name: e.name.clone(),
                    values: e.values.clone(),
                }),
                Some(_) => {}
            }
        }
    }

    fn removals(&mut self, constraints: &ConstraintPlan) {
        for (entity, name) in &constraints.remove_unique {
            self.out.push(Modification::RemoveUniqueConstraint {
                entity_name: entity.clone(),
                constraint_name: name.clone(),
            });
        }
        for (entity, name) in &constraints.remove_index {
            self.out.push(Modification::RemoveIndex {
                entity_name: entity.clone(),
                index_name: name.clone(),
            });
        }

        let old = self.old;
        for o in old.entities.values() {
            for rel in o.relations() {
                if self.kept_relation(o, rel).is_none() {
                    self.out.push(Modification::RemoveRelation {
                        entity_name: o.name.clone(),
                        field_name: rel.name.clone(),
                    });
                }
            }
        }
        for o in old.entities.values() {
            if !self.is_kept(&o.name) {
                continue;
            }
            for col in o.columns() {
                if self.kept_column(o, col).is_none() {
                    self.out.push(Modification::RemoveField {
                        entity_name: o.name.clone(),
                        field_name: col.name.clone(),
                    });
                }
            }
        }

        let dropped: Vec<&str> = old
            .entities
            .keys()
            .map(String::as_str)
            .filter(|name| self.dropped.contains(name))
            .collect();
        for name in ReferenceGraph::build(old).removal_order(&dropped) {
            self.out.push(Modification::RemoveEntity {
                entity_name: name.to_string(),
            });
        }
    }

    /// Table renames and constraint renames, ordered together: both kinds of
    /// name are Postgres relations and can free names for each other.
    fn renames(&mut self, constraint_renames: Vec<Rename<String>>) {
        let mut renames: Vec<Rename<Renamed>> = self
            .new
            .entities
            .values()
            .filter_map(|n| {
                let o = self.kept_old(&n.name)?;
                (o.table_name != n.table_name).then(|| Rename {
                    key: Renamed::Table(n.name.clone()),
                    from: o.table_name.clone(),
                    to: n.table_name.clone(),
                })
            })
            .collect();
        renames.extend(constraint_renames.into_iter().map(|r| Rename {
            key: Renamed::Constraint(r.key),
            from: r.from,
            to: r.to,
        }));
        let (ordered, _) = sequence_renames(renames, OnCycle::TempName);
        for r in ordered {
            self.out.push(match r.key {
                Renamed::Table(entity_name) => Modification::UpdateEntityTableName {
                    entity_name,
                    table_name: r.to,
                },
                Renamed::Constraint(entity_name) => Modification::RenameConstraint {
                    entity_name,
                    constraint_name: r.from,
                    new_name: r.to,
                },
            });
        }
    }

    fn creations(&mut self) {
        let new = self.new;
        for n in new.entities.values() {
            if self.is_kept(&n.name) {
                continue;
            }
            let Some(primary) = n.primary_column() else {
                warn!(entity = %n.name, "entity has no primary column, skipping");
                continue;
            };
            let mut fields = IndexMap::new();
            fields.insert(primary.name.clone(), Field::Column(primary.clone()));
            self.out.push(Modification::CreateEntity {
                entity: Entity {
                    name: n.name.clone(),
                    table_name: n.table_name.clone(),
                    primary: n.primary.clone(),
                    fields,
                    unique: IndexMap::new(),
                    indexes: IndexMap::new(),
                },
            });
            for col in n.columns().filter(|c| c.name != n.primary) {
                self.out.push(Modification::AddField {
                    entity_name: n.name.clone(),
                    field: col.clone(),
                });
            }
        }
    }

    fn field_changes(&mut self, o: &'a Entity, n: &'a Entity) {
        for field in o.fields.values() {
            let to = self.alias(&o.name, field.name());
            if to != field.name() && self.kept_field(o, field) {
                self.out.push(Modification::RenameField {
                    entity_name: o.name.clone(),
                    field_name: field.name().to_string(),
                    new_field_name: to.to_string(),
                });
            }
        }

        let mut renames = Vec::new();
        let mut matched: HashSet<&str> = HashSet::new();
        for col in o.columns() {
            let Some(nc) = self.kept_column(o, col) else { continue };
            matched.insert(nc.name.as_str());
            if col.column_name != nc.column_name {
                renames.push(Rename {
                    key: StorageOwner::Column(nc.name.clone()),
                    from: col.column_name.clone(),
                    to: nc.column_name.clone(),
                });
            }
        }
        for rel in o.relations() {
            let Some(nr) = self.kept_relation(o, rel) else { continue };
            if let (Some(a), Some(b)) = (rel.join_column(), nr.join_column()) {
                if a.column_name != b.column_name {
                    renames.push(Rename {
                        key: StorageOwner::Relation(nr.name.clone()),
                        from: a.column_name.clone(),
                        to: b.column_name.clone(),
                    });
                }
            }
        }
        let (ordered, _) = sequence_renames(renames, OnCycle::TempName);
        for r in ordered {
            self.out.push(match r.key {
                StorageOwner::Column(field_name) => Modification::UpdateColumnName {
                    entity_name: n.name.clone(),
                    field_name,
                    column_name: r.to,
                },
                StorageOwner::Relation(field_name) => Modification::ChangeJoiningColumn {
                    entity_name: n.name.clone(),
                    field_name,
                    column_name: r.to,
                },
            });
        }

        for col in o.columns() {
            if let Some(nc) = self.kept_column(o, col) {
                if !col.same_definition(nc) {
                    self.out.push(Modification::UpdateField {
                        entity_name: n.name.clone(),
                        field: nc.clone(),
                    });
                }
            }
        }
        for nc in n.columns() {
            if !matched.contains(nc.name.as_str()) {
                self.out.push(Modification::AddField {
                    entity_name: n.name.clone(),
                    field: nc.clone(),
                });
            }
        }
    }

    fn relation_changes(&mut self) {
        let new = self.new;
        for n in new.entities.values() {
            // New relation name -> the old relation it continues.
            let mut previous: HashMap<&str, &'a Relation> = HashMap::new();
            if let Some(o) = self.kept_old(&n.name) {
                for rel in o.relations() {
                    if let Some(nr) = self.kept_relation(o, rel) {
                        previous.insert(nr.name.as_str(), rel);
                    }
                }
            }

            for nr in n.relations() {
                let Some(or) = previous.get(nr.name.as_str()).copied() else {
                    self.out.push(Modification::AddRelation {
                        entity_name: n.name.clone(),
                        relation: nr.clone(),
                    });
                    continue;
                };
                if let (Some(a), Some(b)) = (or.join_column(), nr.join_column()) {
                    if a.on_delete != b.on_delete {
                        self.out.push(Modification::ChangeRelationOnDelete {
                            entity_name: n.name.clone(),
                            field_name: nr.name.clone(),
                            on_delete: b.on_delete,
                        });
                    }
                }
                if or.nullable != nr.nullable {
                    self.out.push(Modification::ChangeRelationNullable {
                        entity_name: n.name.clone(),
                        field_name: nr.name.clone(),
                        nullable: nr.nullable,
                    });
                }
                // Renames on the target already moved the inverse along.
                let carried = or
                    .inverse
                    .as_deref()
                    .map(|inv| self.alias(&or.target, inv));
                if carried != nr.inverse.as_deref() {
                    self.out.push(Modification::ChangeRelationInverse {
                        entity_name: n.name.clone(),
                        field_name: nr.name.clone(),
                        inverse: nr.inverse.clone(),
                    });
                }
            }
        }
    }

    fn constraint_additions(&mut self, constraints: ConstraintPlan) {
        for (entity_name, unique) in constraints.add_unique {
            self.out
                .push(Modification::AddUniqueConstraint { entity_name, unique });
        }
        for (entity_name, index) in constraints.add_index {
            self.out.push(Modification::AddIndex { entity_name, index });
        }
    }

    fn enums_after(&mut self) {
        for e in self.old.enums.values() {
            if !self.new.enums.contains_key(&e.name) {
                self.out.push(Modification::RemoveEnum {
                    enum_name: e.name.clone(),
                });
            }
        }
    }
}

/// Keep the hints that name an existing pair of fields of the same variant.
///
/// The first hint for a given old or new name wins.
fn accept_hints<'a>(
    old: &'a Schema,
    new: &'a Schema,
    hints: &RenameHints,
) -> HashMap<&'a str, IndexMap<&'a str, &'a str>> {
    let mut aliases: HashMap<&'a str, IndexMap<&'a str, &'a str>> = HashMap::new();
    for hint in hints.fields() {
        let (Some(o), Some(n)) = (old.entity(&hint.entity), new.entity(&hint.entity)) else {
            warn!(entity = %hint.entity, "ignoring rename hint: entity missing on one side");
            continue;
        };
        let (Some(from), Some(to)) = (o.field(&hint.from), n.field(&hint.to)) else {
            warn!(entity = %hint.entity, from = %hint.from, to = %hint.to, "ignoring rename hint: field missing on one side");
            continue;
        };
        if hint.from == hint.to
            || o.fields.contains_key(&hint.to)
            || n.fields.contains_key(&hint.from)
        {
            warn!(entity = %hint.entity, from = %hint.from, to = %hint.to, "ignoring rename hint: name exists on both sides");
            continue;
        }
        if std::mem::discriminant(from) != std::mem::discriminant(to) {
            warn!(entity = %hint.entity, from = %hint.from, to = %hint.to, "ignoring rename hint: column paired with relation");
            continue;
        }
        let map = aliases.entry(o.name.as_str()).or_default();
        if map.contains_key(from.name()) || map.values().any(|v| *v == to.name()) {
            warn!(entity = %hint.entity, from = %hint.from, to = %hint.to, "ignoring rename hint: conflicts with an earlier one");
            continue;
        }
        map.insert(from.name(), to.name());
    }
    aliases
}
