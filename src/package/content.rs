//! Content index: the integrity record for a package's file tree.
//!
//! # Responsibilities
//! - Enumerate every regular file under a package's content root
//! - Record a SHA-256 digest per file at index time
//! - Re-verify on-disk bytes against the recorded digest on demand
//!
//! # Invariants
//! - Symbolic links are never indexed; a link resolving outside the root
//!   fails the whole build with [`ContentError::PathEscape`]
//! - An index is immutable once built; a reindex produces a new value
//! - Relative paths are `/`-separated with no leading slash

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Errors raised while building or reading a content index.
#[derive(Debug, Error)]
pub enum ContentError {
    /// A symlink (or other entry) resolves outside the package's content root.
    #[error("path escapes content root: {0}")]
    PathEscape(String),

    /// The content root is missing or is not a directory.
    #[error("content root is not a directory: {}", .0.display())]
    MissingRoot(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk content tree: {0}")]
    Walk(#[from] walkdir::Error),
}

/// A SHA-256 content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Hash everything readable from `reader`.
    pub fn from_reader<R: io::Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        io::copy(&mut reader, &mut hasher)?;
        Ok(Self(hasher.finalize().into()))
    }

    /// Encode as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// One servable file within a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub relative_path: String,
    pub hash: ContentHash,
    pub size: u64,
}

/// Result of re-verifying a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryStatus {
    pub path: String,
    pub valid: bool,
}

/// Immutable snapshot of a package's files and their digests.
#[derive(Debug)]
pub struct ContentIndex {
    root: PathBuf,
    entries: BTreeMap<String, ContentEntry>,
    dirs: BTreeSet<String>,
    generation: u64,
}

impl ContentIndex {
    /// Walk `root` and hash every regular file beneath it.
    pub fn build(root: &Path) -> Result<Self, ContentError> {
        let canonical_root = root
            .canonicalize()
            .map_err(|source| ContentError::Io { path: root.to_path_buf(), source })?;
        if !canonical_root.is_dir() {
            return Err(ContentError::MissingRoot(root.to_path_buf()));
        }

        let mut entries = BTreeMap::new();
        let mut dirs = BTreeSet::new();

        for entry in WalkDir::new(&canonical_root).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            if entry.depth() == 0 {
                continue;
            }

            let Some(relative) = relative_key(&canonical_root, entry.path()) else {
                tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 path");
                continue;
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                check_link_target(&canonical_root, entry.path(), &relative)?;
                tracing::debug!(path = %relative, "Symlink excluded from index");
            } else if file_type.is_dir() {
                dirs.insert(relative);
            } else if file_type.is_file() {
                let file = File::open(entry.path())
                    .map_err(|source| ContentError::Io { path: entry.path().to_path_buf(), source })?;
                let size = file.metadata().map(|m| m.len()).unwrap_or_default();
                let hash = ContentHash::from_reader(file)
                    .map_err(|source| ContentError::Io { path: entry.path().to_path_buf(), source })?;
                entries.insert(relative.clone(), ContentEntry { relative_path: relative, hash, size });
            }
        }

        Ok(Self {
            root: canonical_root,
            entries,
            dirs,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Recompute the digest of `entry` from current on-disk bytes.
    ///
    /// Missing files and files replaced by symlinks verify as invalid.
    pub fn verify(&self, entry: &ContentEntry) -> bool {
        let path = self.root.join(&entry.relative_path);
        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_file() => {}
            _ => return false,
        }
        match File::open(&path).and_then(ContentHash::from_reader) {
            Ok(hash) => hash == entry.hash,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Verification read failed");
                false
            }
        }
    }

    /// Verify every entry, in path order.
    pub fn verify_all(&self) -> Vec<EntryStatus> {
        self.entries
            .values()
            .map(|entry| EntryStatus { path: entry.relative_path.clone(), valid: self.verify(entry) })
            .collect()
    }

    /// True iff every entry still matches its recorded digest.
    pub fn is_valid(&self) -> bool {
        self.entries.values().all(|entry| self.verify(entry))
    }

    /// Aggregate digest over the sorted `(path, hash)` list.
    pub fn digest(&self) -> ContentHash {
        let mut hasher = Sha256::new();
        for entry in self.entries.values() {
            hasher.update(entry.relative_path.as_bytes());
            hasher.update([0u8]);
            hasher.update(entry.hash.0);
        }
        ContentHash(hasher.finalize().into())
    }

    pub fn get(&self, relative_path: &str) -> Option<&ContentEntry> {
        self.entries.get(relative_path)
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.contains_key(relative_path)
    }

    /// True if `relative_path` names a directory. The empty path is the root.
    pub fn is_dir(&self, relative_path: &str) -> bool {
        relative_path.is_empty() || self.dirs.contains(relative_path)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ContentEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonicalized content root this index was built from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Monotonic build identifier, unique per process.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

fn check_link_target(root: &Path, link: &Path, relative: &str) -> Result<(), ContentError> {
    match link.canonicalize() {
        Ok(target) if target.starts_with(root) => Ok(()),
        Ok(_) => Err(ContentError::PathEscape(relative.to_string())),
        // Dangling links cannot be served either way.
        Err(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::create_dir_all(dir.path().join("docs/nested")).unwrap();
        fs::write(dir.path().join("docs/a.xml"), "<a/>").unwrap();
        fs::write(dir.path().join("docs/nested/b.txt"), "b").unwrap();
        dir
    }

    #[test]
    fn test_build_indexes_regular_files() {
        let dir = tree();
        let index = ContentIndex::build(dir.path()).unwrap();

        assert_eq!(index.len(), 3);
        assert!(index.contains("index.html"));
        assert!(index.contains("docs/a.xml"));
        assert!(index.contains("docs/nested/b.txt"));
        assert!(index.is_dir("docs"));
        assert!(index.is_dir("docs/nested"));
        assert!(!index.is_dir("docs/a.xml"));
        assert_eq!(index.get("docs/nested/b.txt").unwrap().size, 1);
    }

    #[test]
    fn test_hash_is_stable_across_builds() {
        let dir = tree();
        let first = ContentIndex::build(dir.path()).unwrap();
        let second = ContentIndex::build(dir.path()).unwrap();

        assert_eq!(first.get("index.html").unwrap().hash, second.get("index.html").unwrap().hash);
        assert_eq!(first.digest(), second.digest());
        assert!(second.generation() > first.generation());
        assert_eq!(
            first.get("index.html").unwrap().hash,
            ContentHash::compute(b"<h1>home</h1>")
        );
    }

    #[test]
    fn test_verify_detects_modification() {
        let dir = tree();
        let index = ContentIndex::build(dir.path()).unwrap();
        assert!(index.is_valid());

        fs::write(dir.path().join("docs/a.xml"), "<b/>").unwrap();
        assert!(!index.is_valid());
        let statuses = index.verify_all();
        let broken: Vec<_> = statuses.iter().filter(|s| !s.valid).map(|s| s.path.as_str()).collect();
        assert_eq!(broken, vec!["docs/a.xml"]);

        // Verification never rewrites the stored digest.
        assert_eq!(index.get("docs/a.xml").unwrap().hash, ContentHash::compute(b"<a/>"));
    }

    #[test]
    fn test_verify_missing_file_is_invalid() {
        let dir = tree();
        let index = ContentIndex::build(dir.path()).unwrap();
        fs::remove_file(dir.path().join("index.html")).unwrap();
        assert!(!index.verify(index.get("index.html").unwrap()));
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ContentIndex::build(&dir.path().join("absent")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_root_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret"), "s").unwrap();
        let dir = tree();
        std::os::unix::fs::symlink(outside.path().join("secret"), dir.path().join("leak")).unwrap();

        match ContentIndex::build(dir.path()) {
            Err(ContentError::PathEscape(path)) => assert_eq!(path, "leak"),
            other => panic!("expected PathEscape, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_internal_symlink_is_excluded() {
        let dir = tree();
        std::os::unix::fs::symlink(dir.path().join("index.html"), dir.path().join("alias.html")).unwrap();

        let index = ContentIndex::build(dir.path()).unwrap();
        assert!(!index.contains("alias.html"));
        assert!(index.contains("index.html"));
    }
}
