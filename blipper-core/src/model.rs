//! Data model for repository snapshots and drafts
//!
//! A [`RevisionTree`] is an immutable snapshot of one revision; the only
//! mutable entity is the [`EditableDraft`] the user edits before saving.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;
use crate::paths;

/// Owner/name pair identifying a repository on the remote
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryRef {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(SyncError::InvalidReference(format!(
                "'{}' is not of the form owner/name",
                s
            ))),
        }
    }
}

/// A repository owned by the authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub html_url: String,
}

/// The authenticated principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: u64,
    pub login: String,
}

/// Tree entry type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Tree,
    Blob,
    /// Submodule link; never listed.
    Commit,
}

/// One node of the flattened, recursive listing of a revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Normalized path (single leading `/`)
    pub path: String,
    pub kind: EntryKind,
    /// Content hash
    pub sha: String,
}

impl TreeEntry {
    /// Create an entry, normalizing its path
    pub fn new(path: &str, kind: EntryKind, sha: impl Into<String>) -> Self {
        Self {
            path: paths::normalize(path),
            kind,
            sha: sha.into(),
        }
    }

    pub fn is_blob(&self) -> bool {
        self.kind == EntryKind::Blob
    }

    pub fn is_tree(&self) -> bool {
        self.kind == EntryKind::Tree
    }
}

/// Immutable snapshot of a revision's full file tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionTree {
    /// Revision hash
    pub sha: String,
    pub entries: Vec<TreeEntry>,
    /// The remote cut the listing short
    pub truncated: bool,
}

impl RevisionTree {
    pub fn new(sha: impl Into<String>, entries: Vec<TreeEntry>) -> Self {
        Self {
            sha: sha.into(),
            entries,
            truncated: false,
        }
    }

    pub fn blobs(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter().filter(|e| e.is_blob())
    }

    /// Whether `dir` is the root or a directory entry of this tree.
    pub fn has_directory(&self, dir: &str) -> bool {
        let dir = paths::normalize(dir);
        dir == paths::ROOT || self.entries.iter().any(|e| e.is_tree() && e.path == dir)
    }

    pub fn get(&self, path: &str) -> Option<&TreeEntry> {
        let path = paths::normalize(path);
        self.entries.iter().find(|e| e.path == path)
    }

    /// All directory paths, sorted.
    pub fn directories(&self) -> Vec<&str> {
        let mut dirs: Vec<&str> = self
            .entries
            .iter()
            .filter(|e| e.is_tree())
            .map(|e| e.path.as_str())
            .collect();
        dirs.sort_unstable();
        dirs
    }

    /// Files directly inside `dir`, sorted ascending.
    pub fn files_in(&self, dir: &str) -> Vec<&str> {
        let mut files: Vec<&str> = self
            .blobs()
            .filter(|e| paths::is_direct_child(&e.path, dir))
            .map(|e| e.path.as_str())
            .collect();
        files.sort_unstable();
        files
    }

    /// One page of [`files_in`](Self::files_in), optionally newest first.
    pub fn file_page(&self, dir: &str, page: usize, limit: usize, newest_first: bool) -> FilePage<'_> {
        let mut files = self.files_in(dir);
        if newest_first {
            files.reverse();
        }
        let total = files.len();
        let items = files
            .into_iter()
            .skip(page.saturating_mul(limit))
            .take(limit)
            .collect();
        FilePage {
            items,
            page,
            has_previous: page > 0,
            has_next: page.saturating_add(1).saturating_mul(limit) < total,
        }
    }

    /// Count blobs generated on the same day under `prefix` with `extension`.
    pub fn count_sequenced(&self, prefix: &str, extension: &str) -> usize {
        let suffix = format!(".{}", extension);
        self.blobs()
            .filter(|e| e.path.starts_with(prefix) && e.path.ends_with(&suffix))
            .count()
    }
}

/// A page of file paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePage<'a> {
    pub items: Vec<&'a str>,
    pub page: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

/// A single blob read from the remote, decoded from its transport encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub kind: String,
    pub path: String,
    pub sha: String,
    pub content: Vec<u8>,
}

/// Payload of a draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftContent {
    Text(String),
    Binary(Vec<u8>),
}

impl DraftContent {
    /// Text when the bytes are valid UTF-8, binary otherwise.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => DraftContent::Text(text),
            Err(err) => DraftContent::Binary(err.into_bytes()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            DraftContent::Text(text) => text.as_bytes(),
            DraftContent::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DraftContent::Text(text) => Some(text),
            DraftContent::Binary(_) => None,
        }
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.as_bytes())
    }
}

/// The user's in-progress edit of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditableDraft {
    pub path: String,
    pub content: DraftContent,
    /// Known content hash; `None` means the file is new
    pub sha: Option<String>,
}

impl EditableDraft {
    /// A draft for a file that does not exist yet
    pub fn new_file(path: &str, content: DraftContent) -> Self {
        Self {
            path: paths::normalize(path),
            content,
            sha: None,
        }
    }

    /// A draft of an existing blob
    pub fn from_file(file: FileContent) -> Self {
        Self {
            path: paths::normalize(&file.path),
            content: DraftContent::from_bytes(file.content),
            sha: Some(file.sha),
        }
    }
}

/// An encoded image waiting to be uploaded; always created, never overwritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDraft {
    pub path: String,
    pub base64: String,
}

/// Request body for creating or replacing one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteFileRequest {
    #[serde(skip)]
    pub path: String,
    pub message: String,
    /// Base64-encoded file content
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// What the remote reports after a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub path: String,
    /// New blob hash, when reported
    pub sha: Option<String>,
}
