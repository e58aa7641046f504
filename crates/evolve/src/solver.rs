//! Ordering helpers for the differ, and a plan checker.
//!
//! The differ emits modifications in fixed buckets. Inside a bucket, two
//! things need ordering:
//!
//! 1. Entity removals: an entity referenced by another one goes last.
//! 2. Renames: `a -> b` can only run once nothing is called `b` anymore.
//!
//! ## Example Problem
//!
//! ```text
//! -- This fails: "post" is still taken
//! ALTER TABLE "article" RENAME TO "post";
//! ALTER TABLE "post" RENAME TO "post_old";
//!
//! -- This works:
//! ALTER TABLE "post" RENAME TO "post_old";
//! ALTER TABLE "article" RENAME TO "post";
//! ```

use crate::modification::{Modification, ModificationApplicationError, apply_modifications};
use evolve_schema::{Schema, SchemaHash};
use std::collections::{BTreeMap, BTreeSet};

/// A plan does not take the old schema to the new one.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    /// A modification's precondition does not hold at its position.
    Inapplicable {
        index: usize,
        error: ModificationApplicationError,
    },
    /// Every modification applies, but the result is not the new schema.
    WrongTarget {
        expected: SchemaHash,
        actual: SchemaHash,
    },
}

impl std::fmt::Display for SolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverError::Inapplicable { index, error } => {
                write!(f, "modification #{} does not apply: {}", index, error)
            }
            SolverError::WrongTarget { expected, actual } => {
                write!(f, "plan ends at schema {}, expected {}", actual, expected)
            }
        }
    }
}

impl std::error::Error for SolverError {}

/// Check that `plan` takes `old` exactly to `new`.
pub fn plan_is_applicable(
    old: &Schema,
    plan: &[Modification],
    new: &Schema,
) -> Result<(), SolverError> {
    let result = apply_modifications(old, plan).map_err(|e| SolverError::Inapplicable {
        index: e.index,
        error: e.error,
    })?;
    if &result != new {
        return Err(SolverError::WrongTarget {
            expected: new.content_hash(),
            actual: result.content_hash(),
        });
    }
    Ok(())
}

/// Which entities each entity points at through its relations.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl ReferenceGraph {
    pub fn build(schema: &Schema) -> Self {
        let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entity in schema.entities.values() {
            let targets = edges.entry(entity.name.clone()).or_default();
            for rel in entity.relations() {
                if rel.target != entity.name {
                    targets.insert(rel.target.clone());
                }
            }
        }
        Self { edges }
    }

    /// Entities `entity` references.
    pub fn references(&self, entity: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(entity)
            .into_iter()
            .flat_map(|targets| targets.iter().map(String::as_str))
    }

    /// Order `entities` so that every entity comes before the entities it
    /// references.
    ///
    /// Only edges between members of `entities` count. Members of a cycle
    /// come out in name order; the differ removes every relation of a
    /// removed entity first, so any order is valid there.
    pub fn removal_order<'a>(&self, entities: &[&'a str]) -> Vec<&'a str> {
        let members: BTreeSet<&str> = entities.iter().copied().collect();
        // How many members still reference each member.
        let mut referrers: BTreeMap<&str, usize> = members.iter().map(|e| (*e, 0)).collect();
        for e in &members {
            for target in self.references(e) {
                if let Some(count) = referrers.get_mut(target) {
                    *count += 1;
                }
            }
        }

        let mut ordered = Vec::with_capacity(members.len());
        let mut remaining: BTreeSet<&'a str> = entities.iter().copied().collect();
        while !remaining.is_empty() {
            let next = remaining
                .iter()
                .copied()
                .find(|e| referrers.get(e).copied().unwrap_or(0) == 0)
                .or_else(|| {
                    let first = remaining.iter().copied().next();
                    if let Some(first) = first {
                        tracing::debug!(entity = first, "breaking reference cycle");
                    }
                    first
                });
            let Some(next) = next else { break };
            remaining.remove(next);
            referrers.remove(next);
            for target in self.references(next) {
                if let Some(count) = referrers.get_mut(target) {
                    *count = count.saturating_sub(1);
                }
            }
            ordered.push(next);
        }
        ordered
    }
}

/// A pending rename of something identified by `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename<K> {
    pub key: K,
    pub from: String,
    pub to: String,
}

/// What to do when renames form a cycle (`a -> b`, `b -> a`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnCycle {
    /// Move one member to a temporary name first.
    TempName,
    /// Give up on one member and report it back.
    Fallback,
}

/// Suffix of the temporary names used to break rename cycles.
pub const TEMP_SUFFIX: &str = "_evolve_tmp";

/// Order renames that share one namespace so every target name is free when
/// its rename runs.
///
/// Returns the ordered renames and, with [`OnCycle::Fallback`], the ones that
/// were given up on.
pub fn sequence_renames<K: Clone>(
    renames: Vec<Rename<K>>,
    on_cycle: OnCycle,
) -> (Vec<Rename<K>>, Vec<Rename<K>>) {
    let mut pending = renames;
    let mut ordered = Vec::with_capacity(pending.len());
    let mut fallback = Vec::new();

    while !pending.is_empty() {
        let ready = pending
            .iter()
            .position(|r| !pending.iter().any(|other| other.from == r.to));
        if let Some(i) = ready {
            ordered.push(pending.remove(i));
            continue;
        }
        // Everything left waits on something else: a cycle.
        match on_cycle {
            OnCycle::TempName => {
                let stuck = &mut pending[0];
                let temp = format!("{}{}", stuck.from, TEMP_SUFFIX);
                ordered.push(Rename {
                    key: stuck.key.clone(),
                    from: stuck.from.clone(),
                    to: temp.clone(),
                });
                stuck.from = temp;
            }
            OnCycle::Fallback => fallback.push(pending.remove(0)),
        }
    }
    (ordered, fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolve_schema::{EntityBuilder, RelationBuilder, SchemaBuilder};

    fn rename(key: &'static str, from: &str, to: &str) -> Rename<&'static str> {
        Rename {
            key,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn pairs(renames: &[Rename<&'static str>]) -> Vec<(String, String)> {
        renames
            .iter()
            .map(|r| (r.from.clone(), r.to.clone()))
            .collect()
    }

    #[test]
    fn test_rename_chain_runs_back_to_front() {
        let (ordered, fallback) = sequence_renames(
            vec![rename("a", "post", "post_old"), rename("b", "article", "post")],
            OnCycle::TempName,
        );
        assert!(fallback.is_empty());
        assert_eq!(
            pairs(&ordered),
            vec![
                ("post".to_string(), "post_old".to_string()),
                ("article".to_string(), "post".to_string()),
            ]
        );

        let (ordered, _) = sequence_renames(
            vec![rename("b", "article", "post"), rename("a", "post", "post_old")],
            OnCycle::TempName,
        );
        assert_eq!(ordered[0].from, "post");
    }

    #[test]
    fn test_rename_cycle_with_temp_name() {
        let (ordered, fallback) = sequence_renames(
            vec![rename("a", "x", "y"), rename("b", "y", "x")],
            OnCycle::TempName,
        );
        assert!(fallback.is_empty());
        assert_eq!(
            pairs(&ordered),
            vec![
                ("x".to_string(), "x_evolve_tmp".to_string()),
                ("y".to_string(), "x".to_string()),
                ("x_evolve_tmp".to_string(), "y".to_string()),
            ]
        );
    }

    #[test]
    fn test_rename_cycle_fallback() {
        let (ordered, fallback) = sequence_renames(
            vec![rename("a", "x", "y"), rename("b", "y", "x")],
            OnCycle::Fallback,
        );
        assert_eq!(pairs(&fallback), vec![("x".to_string(), "y".to_string())]);
        assert_eq!(pairs(&ordered), vec![("y".to_string(), "x".to_string())]);
    }

    #[test]
    fn test_removal_order_puts_referrers_first() {
        let schema = SchemaBuilder::new()
            .entity(EntityBuilder::new("User"))
            .entity(EntityBuilder::new("Post").relation(RelationBuilder::many_has_one("author", "User")))
            .entity(EntityBuilder::new("Comment").relation(RelationBuilder::many_has_one("post", "Post")))
            .build()
            .unwrap();
        let graph = ReferenceGraph::build(&schema);
        assert_eq!(
            graph.removal_order(&["User", "Post", "Comment"]),
            vec!["Comment", "Post", "User"]
        );
        // Entities outside the set do not hold anything back.
        assert_eq!(graph.removal_order(&["User", "Post"]), vec!["Post", "User"]);
    }

    #[test]
    fn test_removal_order_with_cycle() {
        let schema = SchemaBuilder::new()
            .entity(EntityBuilder::new("A").relation(RelationBuilder::many_has_one("b", "B")))
            .entity(EntityBuilder::new("B").relation(RelationBuilder::many_has_one("a", "A")))
            .entity(EntityBuilder::new("C").relation(RelationBuilder::many_has_one("a", "A")))
            .build()
            .unwrap();
        let graph = ReferenceGraph::build(&schema);
        assert_eq!(graph.removal_order(&["A", "B", "C"]), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_plan_checker() {
        let old = Schema::default();
        let new = SchemaBuilder::new()
            .entity(EntityBuilder::new("User"))
            .build()
            .unwrap();
        let plan = crate::diff(&old, &new);
        plan_is_applicable(&old, &plan, &new).unwrap();

        let err = plan_is_applicable(&old, &[], &new).unwrap_err();
        assert!(matches!(err, SolverError::WrongTarget { .. }));

        let err = plan_is_applicable(&new, &plan, &new).unwrap_err();
        assert!(matches!(err, SolverError::Inapplicable { index: 0, .. }));
    }
}
