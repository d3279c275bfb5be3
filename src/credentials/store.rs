//! Durable credential tree storage.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use super::snapshot::{
    CredentialEntry, CredentialSnapshot, PersistError, SaveOutcome, DEFAULT_INLINE_LIMIT,
};
use crate::session::SessionName;

/// Extension of files parsed as structured documents.
const DOCUMENT_EXTENSION: &str = "json";

/// Key used for errors that concern the tree root itself.
const ROOT_KEY: &str = ".";

/// Copies driver credential trees into `<root>/<session>/...` and reads them back.
///
/// Operations on the same session are serialized; different sessions
/// never wait on each other. All file I/O runs on the blocking pool.
pub struct CredentialStore {
    root: PathBuf,
    inline_limit: u64,
    locks: Mutex<HashMap<SessionName, Arc<tokio::sync::Mutex<()>>>>,
}

impl CredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            inline_limit: DEFAULT_INLINE_LIMIT,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Set the size below which files are inlined by [`load`](Self::load).
    pub fn with_inline_limit(mut self, limit: u64) -> Self {
        self.inline_limit = limit;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inline_limit(&self) -> u64 {
        self.inline_limit
    }

    /// Durable directory for a session.
    pub fn session_dir(&self, name: &SessionName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Copy `source_root` into the session's durable directory.
    pub async fn save(&self, name: &SessionName, source_root: &Path) -> SaveOutcome {
        let _guard = self.lock(name).await;

        let source = source_root.to_path_buf();
        let target = self.session_dir(name);
        let outcome = blocking(move || copy_tree(&source, &target)).await;
        log_outcome(name, "save", &outcome);
        outcome
    }

    /// Copy the session's durable directory back into `target_root`.
    ///
    /// A session with nothing persisted restores zero files.
    pub async fn restore(&self, name: &SessionName, target_root: &Path) -> SaveOutcome {
        let _guard = self.lock(name).await;

        let source = self.session_dir(name);
        if !source.exists() {
            return SaveOutcome::Success { files: 0 };
        }
        let target = target_root.to_path_buf();
        let outcome = blocking(move || copy_tree(&source, &target)).await;
        log_outcome(name, "restore", &outcome);
        outcome
    }

    /// Read the session's durable tree into a fresh snapshot.
    pub async fn load(&self, name: &SessionName) -> CredentialSnapshot {
        let _guard = self.lock(name).await;

        let dir = self.session_dir(name);
        let limit = self.inline_limit;
        let result = tokio::task::spawn_blocking(move || read_tree(&dir, limit)).await;
        match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(session = %name, "credential load task failed: {}", e);
                let mut entries = BTreeMap::new();
                entries.insert(
                    ROOT_KEY.to_string(),
                    CredentialEntry::Error {
                        message: format!("load task failed: {e}"),
                    },
                );
                CredentialSnapshot::from_entries(entries)
            }
        }
    }

    /// Delete a session's durable tree. Returns whether anything was removed.
    pub async fn remove(&self, name: &SessionName) -> crate::Result<bool> {
        let _guard = self.lock(name).await;

        let dir = self.session_dir(name);
        let removed = tokio::task::spawn_blocking(move || match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        })
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))??;
        Ok(removed)
    }

    /// Serialize operations on one session.
    async fn lock(&self, name: &SessionName) -> NameGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(name.clone()).or_default())
        };
        NameGuard {
            store: self,
            name: name.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

/// Held for the duration of one operation on a session's tree.
///
/// The per-name entry is dropped with the last guard or waiter.
struct NameGuard<'a> {
    store: &'a CredentialStore,
    name: SessionName,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self
            .store
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.name);
        }
    }
}

async fn blocking<F>(f: F) -> SaveOutcome
where
    F: FnOnce() -> SaveOutcome + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(outcome) => outcome,
        Err(e) => SaveOutcome::from_parts(
            0,
            vec![PersistError::new(ROOT_KEY, format!("copy task failed: {e}"))],
        ),
    }
}

fn log_outcome(name: &SessionName, op: &str, outcome: &SaveOutcome) {
    match outcome {
        SaveOutcome::Success { files } => {
            debug!(session = %name, files, "credential {} complete", op);
        }
        SaveOutcome::PartialFailure { files, errors } => {
            warn!(
                session = %name,
                files,
                failures = errors.len(),
                "credential {} completed with errors",
                op
            );
        }
    }
}

#[derive(Default)]
struct CopyReport {
    files: usize,
    errors: Vec<PersistError>,
}

impl CopyReport {
    fn fail(&mut self, path: String, reason: impl ToString) {
        self.errors.push(PersistError::new(path, reason));
    }
}

/// `/`-separated path of `path` relative to `root`.
fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        ROOT_KEY.to_string()
    } else {
        parts.join("/")
    }
}

fn copy_tree(source_root: &Path, target_root: &Path) -> SaveOutcome {
    let mut report = CopyReport::default();

    let root = match fs::canonicalize(source_root) {
        Ok(root) if root.is_dir() => root,
        Ok(_) => {
            report.fail(ROOT_KEY.to_string(), "source root is not a directory");
            return SaveOutcome::from_parts(0, report.errors);
        }
        Err(e) => {
            report.fail(ROOT_KEY.to_string(), format!("source root unavailable: {e}"));
            return SaveOutcome::from_parts(0, report.errors);
        }
    };

    if let Err(e) = fs::create_dir_all(target_root) {
        report.fail(ROOT_KEY.to_string(), format!("cannot create target: {e}"));
        return SaveOutcome::from_parts(0, report.errors);
    }

    copy_dir(&root, &root, target_root, &mut report);
    SaveOutcome::from_parts(report.files, report.errors)
}

fn copy_dir(root: &Path, dir: &Path, target: &Path, report: &mut CopyReport) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            report.fail(relative(root, dir), e);
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.fail(relative(root, dir), e);
                continue;
            }
        };
        let path = entry.path();
        let dest = target.join(entry.file_name());

        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                report.fail(relative(root, &path), e);
                continue;
            }
        };

        if file_type.is_symlink() {
            match fs::canonicalize(&path) {
                Ok(resolved) if !resolved.starts_with(root) => {
                    report.fail(relative(root, &path), "link escapes source root");
                }
                Ok(resolved) if resolved.is_dir() => {
                    report.fail(relative(root, &path), "directory link not followed");
                }
                Ok(resolved) => copy_file(root, &path, &resolved, &dest, report),
                Err(e) => report.fail(relative(root, &path), e),
            }
        } else if file_type.is_dir() {
            if let Err(e) = fs::create_dir_all(&dest) {
                report.fail(relative(root, &path), e);
                continue;
            }
            copy_dir(root, &path, &dest, report);
        } else {
            copy_file(root, &path, &path, &dest, report);
        }
    }
}

fn copy_file(root: &Path, path: &Path, from: &Path, dest: &Path, report: &mut CopyReport) {
    match fs::copy(from, dest) {
        Ok(_) => report.files += 1,
        Err(e) => report.fail(relative(root, path), e),
    }
}

fn read_tree(root: &Path, inline_limit: u64) -> CredentialSnapshot {
    let mut entries = BTreeMap::new();
    match fs::symlink_metadata(root) {
        Ok(meta) if meta.is_dir() => read_dir(root, root, inline_limit, &mut entries),
        Ok(_) => {
            entries.insert(
                ROOT_KEY.to_string(),
                CredentialEntry::Error {
                    message: "session path is not a directory".into(),
                },
            );
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            entries.insert(
                ROOT_KEY.to_string(),
                CredentialEntry::Error {
                    message: e.to_string(),
                },
            );
        }
    }
    CredentialSnapshot::from_entries(entries)
}

fn read_dir(
    root: &Path,
    dir: &Path,
    inline_limit: u64,
    entries: &mut BTreeMap<String, CredentialEntry>,
) {
    let listing = match fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) => {
            entries.insert(
                relative(root, dir),
                CredentialEntry::Error {
                    message: e.to_string(),
                },
            );
            return;
        }
    };

    for entry in listing {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                entries.insert(
                    relative(root, dir),
                    CredentialEntry::Error {
                        message: e.to_string(),
                    },
                );
                continue;
            }
        };
        let path = entry.path();
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => read_dir(root, &path, inline_limit, entries),
            Ok(_) => {
                entries.insert(relative(root, &path), read_entry(&path, inline_limit));
            }
            Err(e) => {
                entries.insert(
                    relative(root, &path),
                    CredentialEntry::Error {
                        message: e.to_string(),
                    },
                );
            }
        }
    }
}

fn read_entry(path: &Path, inline_limit: u64) -> CredentialEntry {
    let is_document = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION));

    if is_document {
        return match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => CredentialEntry::Document { value },
                Err(e) => CredentialEntry::Error {
                    message: format!("invalid document: {e}"),
                },
            },
            Err(e) => CredentialEntry::Error {
                message: e.to_string(),
            },
        };
    }

    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            return CredentialEntry::Error {
                message: e.to_string(),
            }
        }
    };
    if size >= inline_limit {
        return CredentialEntry::Placeholder { size };
    }

    match fs::read(path) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(content) => CredentialEntry::Text { content },
            Err(e) => CredentialEntry::Placeholder {
                size: e.as_bytes().len() as u64,
            },
        },
        Err(e) => CredentialEntry::Error {
            message: e.to_string(),
        },
    }
}
