//! Append-only version history.

use crate::version::{FORMAT_VERSION, Version, reconstruct};
use crate::{Error, Result};
use evolve_schema::Schema;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Where versions live. There is no update and no delete.
pub trait VersionStore {
    /// All versions, oldest first.
    fn versions(&self) -> Result<Vec<Version>>;

    /// Append a version after checking it extends the history.
    fn append(&mut self, version: Version) -> Result<()>;
}

/// Check that `next` can follow `history`: increasing id, hashes chaining
/// from the last post-hash, and a replay that lands on its post-hash.
fn check_append(history: &[Version], next: &Version) -> Result<()> {
    if next.format_version != FORMAT_VERSION {
        return Err(Error::UnsupportedFormat {
            version: next.version.to_string(),
            format_version: next.format_version,
            supported: FORMAT_VERSION,
        });
    }
    if let Some(last) = history.last() {
        if history.iter().any(|v| v.version == next.version) {
            return Err(Error::Store(format!("version {} already exists", next.version)));
        }
        if next.version <= last.version {
            return Err(Error::Store(format!(
                "version {} does not sort after the latest version {}",
                next.version, last.version
            )));
        }
    }
    let expected = match history.last() {
        Some(last) => last.post_hash.clone(),
        None => Schema::default().content_hash(),
    };
    if next.pre_hash != expected {
        return Err(Error::Store(format!(
            "version {} starts from {}, but the history ends at {}",
            next.version, next.pre_hash, expected
        )));
    }
    next.apply(&reconstruct(history)?)?;
    Ok(())
}

/// Versions held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryVersionStore {
    versions: Vec<Version>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionStore for MemoryVersionStore {
    fn versions(&self) -> Result<Vec<Version>> {
        Ok(self.versions.clone())
    }

    fn append(&mut self, version: Version) -> Result<()> {
        check_append(&self.versions, &version)?;
        self.versions.push(version);
        Ok(())
    }
}

/// One `<id>.json` file per version in a directory.
///
/// Each file is written to a temporary file in the same directory and then
/// moved into place without clobbering, so a failed write never leaves a
/// partial `<id>.json` behind. Files are never rewritten.
#[derive(Debug, Clone)]
pub struct DirVersionStore {
    dir: PathBuf,
}

impl DirVersionStore {
    /// Open `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, version: &Version) -> PathBuf {
        self.dir.join(format!("{}.json", version.version))
    }
}

impl VersionStore for DirVersionStore {
    fn versions(&self) -> Result<Vec<Version>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut versions = Vec::with_capacity(paths.len());
        for path in paths {
            let json = std::fs::read_to_string(&path)?;
            let version = Version::from_json(&json)?;
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if stem != version.version.as_str() {
                return Err(Error::Store(format!(
                    "{} holds version {}",
                    path.display(),
                    version.version
                )));
            }
            versions.push(version);
        }
        // File names do not sort like ids: "0001-x.json" < "0001.json".
        versions.sort_by(|a, b| a.version.cmp(&b.version));
        tracing::debug!(dir = %self.dir.display(), count = versions.len(), "loaded versions");
        Ok(versions)
    }

    fn append(&mut self, version: Version) -> Result<()> {
        check_append(&self.versions()?, &version)?;
        let path = self.path_for(&version);
        let json = version.to_json()?;
        if path.exists() {
            return Err(Error::Store(format!("{} already exists", path.display())));
        }
        let mut tmp = tempfile::Builder::new()
            .prefix(".evolve-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(&path).map_err(|e| e.error)?;
        tracing::info!(path = %path.display(), "wrote version {}", version.version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VersionId;
    use evolve_schema::{Column, ColumnType, EntityBuilder, SchemaBuilder};

    fn v1() -> (Schema, Version) {
        let schema = SchemaBuilder::new()
            .entity(EntityBuilder::new("Post").column(Column::new("title", ColumnType::String)))
            .build()
            .unwrap();
        let version =
            Version::plan(VersionId::new("0001").unwrap(), &Schema::default(), &schema).unwrap();
        (schema, version)
    }

    fn v2(from: &Schema, id: &str) -> (Schema, Version) {
        let schema = SchemaBuilder::new()
            .entity(
                EntityBuilder::new("Post")
                    .column(Column::new("title", ColumnType::String))
                    .column(Column::new("body", ColumnType::String)),
            )
            .build()
            .unwrap();
        let version = Version::plan(VersionId::new(id).unwrap(), from, &schema).unwrap();
        (schema, version)
    }

    #[test]
    fn test_memory_store_chains() {
        let mut store = MemoryVersionStore::new();
        let (s1, first) = v1();
        store.append(first.clone()).unwrap();

        // Same id again.
        let err = store.append(first.clone()).unwrap_err();
        assert!(err.to_string().contains("already exists"), "{}", err);

        // Id sorts before the latest one.
        let (_, early) = v2(&s1, "0000");
        let err = store.append(early).unwrap_err();
        assert!(err.to_string().contains("does not sort after"), "{}", err);

        // Does not start where the history ends.
        let (_, detached) = v2(&Schema::default(), "0002");
        assert!(matches!(store.append(detached), Err(Error::Store(_))));

        let (s2, second) = v2(&s1, "0002");
        store.append(second).unwrap();
        assert_eq!(reconstruct(&store.versions().unwrap()).unwrap(), s2);
    }

    #[test]
    fn test_tampered_version_is_rejected() {
        let mut store = MemoryVersionStore::new();
        let (_, mut first) = v1();
        first.modifications.pop();
        assert!(matches!(store.append(first), Err(Error::Programming(_))));
    }

    #[test]
    fn test_dir_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirVersionStore::open(dir.path().join("migrations")).unwrap();
        let (s1, first) = v1();
        store.append(first.clone()).unwrap();
        let (_, second) = v2(&s1, "0002");
        store.append(second.clone()).unwrap();

        let reopened = DirVersionStore::open(dir.path().join("migrations")).unwrap();
        assert_eq!(reopened.versions().unwrap(), vec![first, second]);
        assert!(dir.path().join("migrations/0001.json").exists());
    }

    #[test]
    fn test_dir_store_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirVersionStore::open(dir.path()).unwrap();
        let (_, first) = v1();
        std::fs::write(dir.path().join("0001.json.bak"), "ignored").unwrap();
        store.append(first.clone()).unwrap();
        assert_eq!(store.versions().unwrap().len(), 1);
        assert!(store.append(first).is_err());
    }

    #[test]
    fn test_dir_store_orders_by_id_not_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirVersionStore::open(dir.path()).unwrap();
        let (s1, first) = v1();
        store.append(first.clone()).unwrap();
        let (s2, second) = v2(&s1, "0001-x");
        store.append(second.clone()).unwrap();

        let versions = DirVersionStore::open(dir.path()).unwrap().versions().unwrap();
        assert_eq!(versions, vec![first, second]);
        assert_eq!(reconstruct(&versions).unwrap(), s2);
    }

    #[test]
    fn test_dir_store_leaves_no_stray_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirVersionStore::open(dir.path()).unwrap();
        // Leftover from an interrupted write; not a version.
        std::fs::write(dir.path().join(".evolve-abc.tmp"), "{\"trunc").unwrap();
        let (_, first) = v1();
        store.append(first.clone()).unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![".evolve-abc.tmp", "0001.json"]);
        assert_eq!(store.versions().unwrap(), vec![first]);
    }
}
