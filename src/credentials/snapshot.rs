//! Result types produced by the credential store.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Files below this size are inlined as text by default.
pub const DEFAULT_INLINE_LIMIT: u64 = 2000;

/// A single path that could not be copied or read.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{path}: {reason}")]
pub struct PersistError {
    /// Path relative to the tree root, `/`-separated. `.` is the root itself.
    pub path: String,
    pub reason: String,
}

impl PersistError {
    pub fn new(path: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome of copying a credential tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// Every file was copied.
    Success { files: usize },
    /// Some entries failed; `files` were copied regardless.
    PartialFailure {
        files: usize,
        errors: Vec<PersistError>,
    },
}

impl SaveOutcome {
    pub(crate) fn from_parts(files: usize, errors: Vec<PersistError>) -> Self {
        if errors.is_empty() {
            Self::Success { files }
        } else {
            Self::PartialFailure { files, errors }
        }
    }

    /// Number of files written.
    pub fn files(&self) -> usize {
        match self {
            Self::Success { files } | Self::PartialFailure { files, .. } => *files,
        }
    }

    pub fn errors(&self) -> &[PersistError] {
        match self {
            Self::Success { .. } => &[],
            Self::PartialFailure { errors, .. } => errors,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// One entry of a [`CredentialSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialEntry {
    /// Parsed structured document.
    Document { value: serde_json::Value },
    /// Small UTF-8 file, inlined verbatim.
    Text { content: String },
    /// Large or binary file, represented by its size in bytes.
    Placeholder { size: u64 },
    /// The path could not be read or parsed.
    Error { message: String },
}

impl CredentialEntry {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Immutable view of a session's persisted credential tree.
///
/// Keys are `/`-separated paths relative to the session directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CredentialSnapshot {
    entries: BTreeMap<String, CredentialEntry>,
}

impl CredentialSnapshot {
    pub(crate) fn from_entries(entries: BTreeMap<String, CredentialEntry>) -> Self {
        Self { entries }
    }

    pub fn get(&self, path: &str) -> Option<&CredentialEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CredentialEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries that are error markers.
    pub fn error_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_error()).count()
    }
}
