//! Human-readable output.

use evolve::{Modification, TargetState, Version};
use evolve_schema::{Field, Joining, Schema};
use owo_colors::OwoColorize;
use std::fmt::Write;

pub fn status(versions: &[Version], state: &TargetState) {
    println!("{}", "Applied:".bold());
    if state.applied.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for applied in &state.applied {
        let known = versions.iter().any(|v| v.version == applied.version);
        let marker = if known {
            "✓".green().to_string()
        } else {
            "?".red().to_string()
        };
        println!(
            "  {} {} {}",
            marker,
            applied.version,
            applied.applied_at.to_string().dimmed()
        );
    }

    let done = match &state.cursor {
        None => Some(0),
        Some(cursor) => versions
            .iter()
            .position(|v| &v.version == cursor)
            .map(|i| i + 1),
    };
    println!();
    match done {
        Some(done) => {
            let pending = &versions[done..];
            println!("{} {}", "Pending:".bold(), pending.len());
            for version in pending {
                println!(
                    "  {} {} ({} modifications)",
                    "•".yellow(),
                    version.version,
                    version.modifications.len()
                );
            }
        }
        None => println!(
            "{}",
            "The database is at a version this history does not contain.".red()
        ),
    }
}

/// A warning listing the modifications that drop data, if there are any.
pub fn destructive_warning(plan: &[Modification]) -> Option<String> {
    let drops: Vec<String> = plan
        .iter()
        .filter(|m| m.is_destructive())
        .map(|m| m.describe())
        .collect();
    if drops.is_empty() {
        return None;
    }
    let mut out = format!(
        "warning: {} modification{} drop data:",
        drops.len(),
        if drops.len() == 1 { "" } else { "s" }
    );
    for drop in drops {
        let _ = write!(out, "\n  {}", drop);
    }
    Some(out)
}

/// The schema as an indented listing, one line per field.
pub fn schema(schema: &Schema) -> String {
    let mut out = String::new();
    if schema.is_empty() {
        out.push_str("Empty schema.\n");
        return out;
    }

    for e in schema.enums.values() {
        let _ = writeln!(out, "enum {} ({})", e.name, e.values.join(", "));
    }
    if !schema.enums.is_empty() {
        out.push('\n');
    }

    for entity in schema.entities.values() {
        let _ = writeln!(out, "{} ({})", entity.name, entity.table_name);
        for field in entity.fields.values() {
            match field {
                Field::Column(col) => {
                    let mut attrs = Vec::new();
                    if col.name == entity.primary {
                        attrs.push("PK".to_string());
                    }
                    if !col.nullable {
                        attrs.push("NOT NULL".to_string());
                    }
                    if let Some(default) = &col.default {
                        attrs.push(format!("DEFAULT {}", default));
                    }
                    if col.column_name != col.name {
                        attrs.push(format!("column {}", col.column_name));
                    }
                    let attrs = if attrs.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", attrs.join(", "))
                    };
                    let _ = writeln!(
                        out,
                        "    {}: {}{}",
                        col.name,
                        col.column_type.sql_type(),
                        attrs
                    );
                }
                Field::Relation(rel) => {
                    let storage = match &rel.joining {
                        Some(Joining::Column(jc)) => {
                            format!(" via {} on delete {}", jc.column_name, jc.on_delete)
                        }
                        Some(Joining::Table(jt)) => format!(" via {}", jt.table_name),
                        None => String::new(),
                    };
                    let inverse = rel
                        .inverse
                        .as_deref()
                        .map(|i| format!(" <-> {}.{}", rel.target, i))
                        .unwrap_or_default();
                    let _ = writeln!(
                        out,
                        "    {}: {} {}{}{}",
                        rel.name, rel.kind, rel.target, storage, inverse
                    );
                }
            }
        }
        for unique in entity.unique.values() {
            let _ = writeln!(out, "    UNIQUE {} ({})", unique.name, unique.fields.join(", "));
        }
        for index in entity.indexes.values() {
            let _ = writeln!(out, "    INDEX {} ({})", index.name, index.fields.join(", "));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolve_schema::{
        Column, ColumnType, EntityBuilder, OnDelete, RelationBuilder, SchemaBuilder,
    };

    #[test]
    fn lists_entities_and_fields() {
        let built = SchemaBuilder::new()
            .entity(
                EntityBuilder::new("Post")
                    .column(Column::new("title", ColumnType::String).not_null())
                    .named_unique("post_title_key", ["title"]),
            )
            .entity(
                EntityBuilder::new("Comment")
                    .column(Column::new("text", ColumnType::String))
                    .relation(
                        RelationBuilder::many_has_one("post", "Post").on_delete(OnDelete::Cascade),
                    ),
            )
            .build()
            .unwrap();

        let text = schema(&built);
        assert!(text.starts_with("Post (post)\n"), "{}", text);
        assert!(text.contains("    id: uuid [PK, NOT NULL]\n"), "{}", text);
        assert!(text.contains("    title: text [NOT NULL]\n"), "{}", text);
        assert!(text.contains("    UNIQUE post_title_key (title)\n"), "{}", text);
        assert!(text.contains("Comment (comment)\n"), "{}", text);
        assert!(text.contains("    post: "), "{}", text);
        assert!(text.contains(" Post via post_id on delete "), "{}", text);
    }

    #[test]
    fn warns_about_drops_only() {
        let plan = vec![
            Modification::RemoveField {
                entity_name: "Post".into(),
                field_name: "body".into(),
            },
            Modification::RenameConstraint {
                entity_name: "Post".into(),
                constraint_name: "a".into(),
                new_name: "b".into(),
            },
            Modification::RemoveEntity {
                entity_name: "Tag".into(),
            },
        ];
        let warning = destructive_warning(&plan).unwrap();
        assert!(warning.starts_with("warning: 2 modifications drop data:"), "{}", warning);
        assert_eq!(warning.lines().count(), 3, "{}", warning);
        assert!(destructive_warning(&plan[1..2]).is_none());
        assert!(destructive_warning(&[]).is_none());
    }

    #[test]
    fn empty_schema() {
        assert_eq!(schema(&Schema::default()), "Empty schema.\n");
    }
}
