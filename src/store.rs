//! Versioned document storage
//!
//! `FileStore` is the remote key/value primitive: read a path with its version
//! token, write a path only if the token still matches. `HabitStore` builds the
//! yearly habit documents on top of it, including the shortcut migration for
//! files written before shortcuts existed.

use crate::codec;
use crate::document::HabitDocument;
use crate::shortcuts;
use sha2::{Digest, Sha256};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The version token no longer matches the stored file
    #[error("Version conflict writing {path}")]
    Conflict { path: String },

    #[error("{operation} {path} failed with HTTP {status}: {message}")]
    Transport {
        operation: &'static str,
        path: String,
        status: u16,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not decode {path}: {message}")]
    Encoding { path: String, message: String },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// File content together with the token identifying its revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub content: String,
    pub token: String,
}

/// A path-keyed document store with conditional writes
pub trait FileStore {
    /// Read a file. `Ok(None)` when it does not exist.
    fn get(&self, path: &str) -> Result<Option<StoredFile>>;

    /// Write a file if `token` matches its current revision. `None` is only
    /// valid when the file does not exist yet. `message` describes the change.
    fn put(&self, path: &str, content: &str, token: Option<&str>, message: &str) -> Result<()>;
}

impl<S: FileStore + ?Sized> FileStore for &S {
    fn get(&self, path: &str) -> Result<Option<StoredFile>> {
        (**self).get(path)
    }

    fn put(&self, path: &str, content: &str, token: Option<&str>, message: &str) -> Result<()> {
        (**self).put(path, content, token, message)
    }
}

impl<S: FileStore + ?Sized> FileStore for Box<S> {
    fn get(&self, path: &str) -> Result<Option<StoredFile>> {
        (**self).get(path)
    }

    fn put(&self, path: &str, content: &str, token: Option<&str>, message: &str) -> Result<()> {
        (**self).put(path, content, token, message)
    }
}

/// Check a write against the current token of a file
fn check_token(path: &str, current: Option<&str>, expected: Option<&str>) -> Result<()> {
    if current == expected {
        Ok(())
    } else {
        Err(StoreError::Conflict {
            path: path.to_string(),
        })
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// A write accepted by `MemoryStore`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub path: String,
    pub message: String,
}

/// In-process store with numeric version tokens. Keeps every accepted write
/// as a `Commit` so callers can inspect the change history.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RefCell<BTreeMap<String, (String, u64)>>,
    commits: RefCell<Vec<Commit>>,
    next_version: Cell<u64>,
    reject_next_put: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a file without recording a commit. Returns its token.
    pub fn insert(&self, path: &str, content: &str) -> String {
        let version = self.bump();
        self.files
            .borrow_mut()
            .insert(path.to_string(), (content.to_string(), version));
        version.to_string()
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.files.borrow().get(path).map(|(content, _)| content.clone())
    }

    pub fn commits(&self) -> Vec<Commit> {
        self.commits.borrow().clone()
    }

    /// Make the next `put` fail as if another writer got there first
    pub fn reject_next_put(&self) {
        self.reject_next_put.set(true);
    }

    fn bump(&self) -> u64 {
        let version = self.next_version.get() + 1;
        self.next_version.set(version);
        version
    }
}

impl FileStore for MemoryStore {
    fn get(&self, path: &str) -> Result<Option<StoredFile>> {
        Ok(self
            .files
            .borrow()
            .get(path)
            .map(|(content, version)| StoredFile {
                content: content.clone(),
                token: version.to_string(),
            }))
    }

    fn put(&self, path: &str, content: &str, token: Option<&str>, message: &str) -> Result<()> {
        if self.reject_next_put.replace(false) {
            return Err(StoreError::Conflict {
                path: path.to_string(),
            });
        }

        let current = self
            .files
            .borrow()
            .get(path)
            .map(|(_, version)| version.to_string());
        check_token(path, current.as_deref(), token)?;

        let version = self.bump();
        self.files
            .borrow_mut()
            .insert(path.to_string(), (content.to_string(), version));
        self.commits.borrow_mut().push(Commit {
            path: path.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// Local directory store
// =============================================================================

const HISTORY_FILE: &str = "history.log";

/// Compute SHA256 hash of content, used as the version token
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Files under a local directory. The version token is the SHA-256 of the
/// current content; change messages are appended to `history.log`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    fn record(&self, path: &str, message: &str) -> Result<()> {
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(HISTORY_FILE))?;
        writeln!(
            log,
            "{}\t{}\t{}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            path,
            message
        )?;
        Ok(())
    }
}

impl FileStore for LocalStore {
    fn get(&self, path: &str) -> Result<Option<StoredFile>> {
        match fs::read_to_string(self.resolve(path)) {
            Ok(content) => {
                let token = content_hash(&content);
                Ok(Some(StoredFile { content, token }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, path: &str, content: &str, token: Option<&str>, message: &str) -> Result<()> {
        let target = self.resolve(path);
        let current = self.get(path)?.map(|file| file.token);
        check_token(path, current.as_deref(), token)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content)?;
        // The write already happened; history is best effort
        if let Err(e) = self.record(path, message) {
            log::warn!("Could not append to {}: {}", HISTORY_FILE, e);
        }
        log::debug!("Wrote {} ({})", target.display(), message);
        Ok(())
    }
}

// =============================================================================
// Habit documents
// =============================================================================

pub const DEFAULT_PATH_PREFIX: &str = "data/habits";

/// A decoded yearly document and the token it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedDocument {
    pub document: HabitDocument,
    pub token: String,
}

/// Loads and saves one `HabitDocument` per calendar year
#[derive(Debug, Clone)]
pub struct HabitStore<S> {
    files: S,
    path_prefix: String,
}

impl<S: FileStore> HabitStore<S> {
    pub fn new(files: S) -> Self {
        Self::with_prefix(files, DEFAULT_PATH_PREFIX)
    }

    pub fn with_prefix(files: S, path_prefix: &str) -> Self {
        Self {
            files,
            path_prefix: path_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Path of the document for `year`, e.g. `data/habits/2025.yaml`
    pub fn path_for(&self, year: i32) -> String {
        if self.path_prefix.is_empty() {
            format!("{:04}.yaml", year)
        } else {
            format!("{}/{:04}.yaml", self.path_prefix, year)
        }
    }

    /// Read the document for `year` without migrating it
    pub fn peek(&self, year: i32) -> Result<Option<VersionedDocument>> {
        let path = self.path_for(year);
        Ok(self.files.get(&path)?.map(|file| VersionedDocument {
            document: codec::decode(&file.content),
            token: file.token,
        }))
    }

    /// Read the document for `year`. Older documents without shortcuts are
    /// migrated and written back first; if that write loses a race, the
    /// unmigrated document is returned and migration waits for a later load.
    pub fn load(&self, year: i32) -> Result<Option<VersionedDocument>> {
        let Some(loaded) = self.peek(year)? else {
            log::debug!("No document for {}", year);
            return Ok(None);
        };

        if !loaded.document.needs_shortcut_migration() {
            return Ok(Some(loaded));
        }

        let mut migrated = loaded.document.clone();
        let assigned = shortcuts::backfill(&mut migrated);
        let message = format!("Assign shortcuts for {}", year);

        match self.save(year, &migrated, Some(&loaded.token), &message) {
            Ok(()) => {
                log::info!("Migrated {} with {} shortcut(s)", self.path_for(year), assigned.len());
                self.peek(year)
            }
            Err(e) if e.is_conflict() => {
                log::warn!("Shortcut migration for {} lost a race, will retry later", year);
                Ok(Some(loaded))
            }
            Err(e) => Err(e),
        }
    }

    /// Write the document for `year`. `token` must come from the latest load
    /// of that year, or be `None` when the year has no file yet.
    pub fn save(
        &self,
        year: i32,
        document: &HabitDocument,
        token: Option<&str>,
        message: &str,
    ) -> Result<()> {
        let path = self.path_for(year);
        log::debug!("Saving {}: {}", path, message);
        self.files.put(&path, &codec::encode(document), token, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LEGACY: &str = "_hidden:\n  - \"old\"\n\nyoga:\n  - \"2024-01-02\"\n\nold:\n\nrun:\n";

    #[test]
    fn test_memory_store_conditional_writes() {
        let store = MemoryStore::new();
        assert!(store.get("a").unwrap().is_none());

        store.put("a", "one", None, "create").unwrap();
        let first = store.get("a").unwrap().unwrap();

        // Creating again without a token conflicts
        assert!(store.put("a", "two", None, "again").unwrap_err().is_conflict());

        store.put("a", "two", Some(&first.token), "update").unwrap();
        // The old token is stale now
        assert!(store
            .put("a", "three", Some(&first.token), "stale")
            .unwrap_err()
            .is_conflict());

        assert_eq!(store.content("a").as_deref(), Some("two"));
        let messages: Vec<_> = store.commits().into_iter().map(|c| c.message).collect();
        assert_eq!(messages, vec!["create", "update"]);
    }

    #[test]
    fn test_memory_store_reject_next_put() {
        let store = MemoryStore::new();
        store.reject_next_put();
        assert!(store.put("a", "x", None, "m").unwrap_err().is_conflict());
        store.put("a", "x", None, "m").unwrap();
    }

    #[test]
    fn test_local_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        assert!(store.get("data/habits/2025.yaml").unwrap().is_none());
        store
            .put("data/habits/2025.yaml", "run:\n", None, "Add habit run")
            .unwrap();

        let file = store.get("data/habits/2025.yaml").unwrap().unwrap();
        assert_eq!(file.content, "run:\n");
        assert_eq!(file.token, content_hash("run:\n"));
        assert!(dir.path().join("data/habits/2025.yaml").exists());

        let history = fs::read_to_string(dir.path().join(HISTORY_FILE)).unwrap();
        assert!(history.contains("Add habit run"));
    }

    #[test]
    fn test_local_store_rejects_stale_token() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        store.put("x.yaml", "a", None, "create").unwrap();
        let stale = content_hash("something else");

        let err = store.put("x.yaml", "b", Some(&stale), "edit").unwrap_err();
        assert!(err.is_conflict());
        assert!(store.put("x.yaml", "b", None, "edit").unwrap_err().is_conflict());
    }

    #[test]
    fn test_local_store_write_survives_history_failure() {
        let dir = TempDir::new().unwrap();
        // A directory where the history file should be makes appending fail
        fs::create_dir(dir.path().join(HISTORY_FILE)).unwrap();
        let store = LocalStore::new(dir.path());

        store.put("x.yaml", "run:\n", None, "Add habit run").unwrap();
        assert_eq!(store.get("x.yaml").unwrap().unwrap().content, "run:\n");
    }

    #[test]
    fn test_local_store_stays_inside_root() {
        let store = LocalStore::new("/srv/habits");
        assert_eq!(store.resolve("../../etc/passwd"), PathBuf::from("/srv/habits/etc/passwd"));
    }

    #[test]
    fn test_path_for_year() {
        let store = HabitStore::new(MemoryStore::new());
        assert_eq!(store.path_for(2025), "data/habits/2025.yaml");

        let store = HabitStore::with_prefix(MemoryStore::new(), "habits/");
        assert_eq!(store.path_for(2026), "habits/2026.yaml");
    }

    #[test]
    fn test_load_missing_year() {
        let store = HabitStore::new(MemoryStore::new());
        assert!(store.load(2025).unwrap().is_none());
    }

    #[test]
    fn test_load_migrates_legacy_document() {
        let files = MemoryStore::new();
        files.insert("data/habits/2024.yaml", LEGACY);
        let store = HabitStore::new(&files);

        let loaded = store.load(2024).unwrap().unwrap();

        assert_eq!(loaded.document.shortcut_for("run"), Some('r'));
        assert_eq!(loaded.document.shortcut_for("yoga"), Some('y'));
        assert_eq!(loaded.document.shortcut_for("old"), None);

        let commits = files.commits();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, "Assign shortcuts for 2024");

        // The returned token is the post-migration one
        let current = files.get("data/habits/2024.yaml").unwrap().unwrap();
        assert_eq!(loaded.token, current.token);
        assert!(current.content.starts_with("_hidden:"));
        assert!(current.content.contains("_shortcuts:\n  r: \"run\"\n  y: \"yoga\"\n"));
    }

    #[test]
    fn test_migration_conflict_returns_unmigrated_document() {
        let files = MemoryStore::new();
        let token = files.insert("data/habits/2024.yaml", LEGACY);
        files.reject_next_put();
        let store = HabitStore::new(&files);

        let loaded = store.load(2024).unwrap().unwrap();

        assert!(loaded.document.shortcuts.is_empty());
        assert_eq!(loaded.token, token);
        assert!(files.commits().is_empty());

        // Next load succeeds
        let loaded = store.load(2024).unwrap().unwrap();
        assert_eq!(loaded.document.shortcuts.len(), 2);
    }

    #[test]
    fn test_peek_does_not_migrate() {
        let files = MemoryStore::new();
        files.insert("data/habits/2024.yaml", LEGACY);
        let store = HabitStore::new(&files);

        let peeked = store.peek(2024).unwrap().unwrap();
        assert!(peeked.document.shortcuts.is_empty());
        assert!(files.commits().is_empty());
    }

    #[test]
    fn test_save_new_year_without_token() {
        let files = MemoryStore::new();
        let store = HabitStore::new(&files);
        let mut doc = HabitDocument::new();
        doc.insert_habit("run");

        store.save(2025, &doc, None, "Add habit run").unwrap();
        assert_eq!(files.content("data/habits/2025.yaml").as_deref(), Some("run:\n"));
    }
}
