//! Versions: planned, hashed modification lists.

use crate::error::{ProgrammingError, UnknownModificationError};
use crate::modification::{Modification, apply_modifications};
use crate::diff::{RenameHints, diff_with_hints};
use crate::{Error, Result};
use evolve_schema::{Schema, SchemaHash};
use facet::Facet;
use std::fmt;

/// Format of the persisted version record.
pub const FORMAT_VERSION: u32 = 1;

/// Sortable version identifier, e.g. `2026-10-18-093000-add-comments`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
#[facet(transparent)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::InvalidVersionId(id));
        }
        Ok(Self(id))
    }

    /// `YYYY-MM-DD-HHMMSS-<slug>`, timestamp in UTC.
    pub fn timestamped(at: jiff::Timestamp, name: &str) -> Result<Self> {
        let slug: String = name
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        let slug = slug.trim_matches('-');
        let stamp = at.strftime("%Y-%m-%d-%H%M%S");
        if slug.is_empty() {
            Self::new(stamp.to_string())
        } else {
            Self::new(format!("{}-{}", stamp, slug))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One immutable history entry.
#[derive(Debug, Clone, PartialEq, Facet)]
#[facet(rename_all = "camelCase")]
pub struct Version {
    pub version: VersionId,
    pub format_version: u32,
    pub modifications: Vec<Modification>,
    /// Hash of the schema this version applies to.
    pub pre_hash: SchemaHash,
    /// Hash of the schema after applying every modification.
    pub post_hash: SchemaHash,
}

// Just enough of a record to check it before parsing it for real.
#[derive(Facet)]
#[facet(rename_all = "camelCase")]
struct RecordHeader {
    version: String,
    format_version: u32,
    #[facet(default)]
    modifications: Vec<ModificationHeader>,
}

#[derive(Facet)]
struct ModificationHeader {
    modification: String,
}

impl Version {
    /// Plan the version taking `old` to `new`.
    ///
    /// Refuses to create an empty version.
    pub fn plan(id: VersionId, old: &Schema, new: &Schema) -> Result<Self> {
        Self::plan_with_hints(id, old, new, &RenameHints::default())
    }

    /// Like [`Version::plan`], with field renames the differ cannot infer.
    pub fn plan_with_hints(
        id: VersionId,
        old: &Schema,
        new: &Schema,
        hints: &RenameHints,
    ) -> Result<Self> {
        old.validate()?;
        new.validate()?;
        let modifications = diff_with_hints(old, new, hints);
        if modifications.is_empty() {
            return Err(Error::EmptyPlan);
        }
        let version = Version {
            version: id,
            format_version: FORMAT_VERSION,
            modifications,
            pre_hash: old.content_hash(),
            post_hash: new.content_hash(),
        };
        // A plan that does not land on `new` is a differ bug.
        version.apply(old)?;
        Ok(version)
    }

    /// Apply this version to `schema`, checking both hashes.
    pub fn apply(&self, schema: &Schema) -> Result<Schema> {
        let actual = schema.content_hash();
        if actual != self.pre_hash {
            return Err(crate::MigrationConflictError::HashMismatch {
                version: self.version.clone(),
                expected: self.pre_hash.clone(),
                actual,
            }
            .into());
        }
        let next = apply_modifications(schema, &self.modifications).map_err(|source| {
            Error::Replay {
                version: self.version.clone(),
                source,
            }
        })?;
        let actual = next.content_hash();
        if actual != self.post_hash {
            return Err(ProgrammingError {
                version: self.version.clone(),
                expected: self.post_hash.clone(),
                actual,
            }
            .into());
        }
        Ok(next)
    }

    /// Parse a persisted record.
    ///
    /// The format version and every modification kind are checked before the
    /// full parse, so an unknown kind is reported as such rather than as a
    /// JSON error.
    pub fn from_json(json: &str) -> Result<Self> {
        let header: RecordHeader =
            facet_json::from_str(json).map_err(|e| Error::Json(e.to_string()))?;
        if header.format_version > FORMAT_VERSION {
            return Err(Error::UnsupportedFormat {
                version: header.version,
                format_version: header.format_version,
                supported: FORMAT_VERSION,
            });
        }
        for (index, m) in header.modifications.iter().enumerate() {
            if !Modification::KINDS.contains(&m.modification.as_str()) {
                return Err(UnknownModificationError {
                    version: header.version.clone(),
                    index,
                    kind: m.modification.clone(),
                }
                .into());
            }
        }
        let version: Version =
            facet_json::from_str(json).map_err(|e| Error::Json(e.to_string()))?;
        VersionId::new(version.version.as_str())?;
        Ok(version)
    }

    pub fn to_json(&self) -> Result<String> {
        facet_json::to_string_pretty(self).map_err(|e| Error::Json(e.to_string()))
    }
}

/// Fold a whole history from the empty schema.
pub fn reconstruct(versions: &[Version]) -> Result<Schema> {
    let mut schema = Schema::default();
    for version in versions {
        schema = version.apply(&schema)?;
    }
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolve_schema::{Column, ColumnType, EntityBuilder, SchemaBuilder};

    fn post() -> Schema {
        SchemaBuilder::new()
            .entity(EntityBuilder::new("Post").column(Column::new("title", ColumnType::String)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_version_id_validation() {
        assert!(VersionId::new("2026-10-18-093000-init").is_ok());
        assert!(VersionId::new("v_1").is_ok());
        assert!(matches!(VersionId::new(""), Err(Error::InvalidVersionId(_))));
        assert!(matches!(VersionId::new("../etc"), Err(Error::InvalidVersionId(_))));
    }

    #[test]
    fn test_timestamped_id() {
        let at: jiff::Timestamp = "2026-10-18T09:30:00Z".parse().unwrap();
        let id = VersionId::timestamped(at, "Add comments!").unwrap();
        assert_eq!(id.as_str(), "2026-10-18-093000-add-comments");
        assert!(VersionId::timestamped(at, "later").unwrap() > id);
    }

    #[test]
    fn test_plan_refuses_empty_diff() {
        let id = VersionId::new("v1").unwrap();
        assert!(matches!(
            Version::plan(id, &post(), &post()),
            Err(Error::EmptyPlan)
        ));
    }

    #[test]
    fn test_plan_and_json_roundtrip() {
        let v = Version::plan(VersionId::new("v1").unwrap(), &Schema::default(), &post()).unwrap();
        assert_eq!(v.pre_hash, Schema::default().content_hash());
        assert_eq!(v.post_hash, post().content_hash());

        let json = v.to_json().unwrap();
        assert!(json.contains("\"formatVersion\""), "{}", json);
        assert!(json.contains("\"createEntity\""), "{}", json);
        let back = Version::from_json(&json).unwrap();
        assert_eq!(back, v);
        assert_eq!(reconstruct(&[back]).unwrap(), post());
    }

    #[test]
    fn test_unknown_kind_is_reported() {
        let json = r#"{
            "version": "v1",
            "formatVersion": 1,
            "modifications": [
                {"modification": "createEnum", "enumName": "Status", "values": ["a"]},
                {"modification": "addFulltextIndex", "entityName": "Post"}
            ],
            "preHash": "x",
            "postHash": "y"
        }"#;
        match Version::from_json(json) {
            Err(Error::UnknownModification(e)) => {
                assert_eq!(e.index, 1);
                assert_eq!(e.kind, "addFulltextIndex");
            }
            other => panic!("expected UnknownModification, got {:?}", other),
        }
    }

    #[test]
    fn test_newer_format_is_refused() {
        let json = r#"{"version": "v1", "formatVersion": 2, "modifications": [], "preHash": "x", "postHash": "y"}"#;
        assert!(matches!(
            Version::from_json(json),
            Err(Error::UnsupportedFormat { format_version: 2, .. })
        ));
    }

    #[test]
    fn test_apply_checks_pre_hash() {
        let v = Version::plan(VersionId::new("v1").unwrap(), &Schema::default(), &post()).unwrap();
        assert!(matches!(
            v.apply(&post()),
            Err(Error::MigrationConflict(_))
        ));
    }
}
