//! Source-control operations used by the sync engine
//!
//! [`SourceControl`] is the seam between the engine and the hosting service.
//! [`GitHubClient`] talks to the GitHub REST API; [`MemoryRemote`] keeps a
//! whole commit history in memory with the same precondition rules.

mod github;
mod memory;

pub use github::{GITHUB_API_VERSION, GitHubClient};
pub use memory::{MemoryRemote, blob_sha};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    CurrentUser, FileContent, RepositoryRef, RepositorySummary, RevisionTree, WriteFileRequest,
    WriteReceipt,
};

/// Remote repository operations
///
/// Every operation requires a stored credential and fails with
/// [`SyncError::MissingCredential`](crate::SyncError::MissingCredential)
/// before touching the network when none is present.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// The authenticated user
    async fn current_user(&self) -> Result<CurrentUser>;

    /// All repositories owned by the authenticated user, or a single error.
    /// Never a partial list.
    async fn list_repositories(&self) -> Result<Vec<RepositorySummary>>;

    /// Hash of the most recent revision
    async fn latest_revision(&self, repo: &RepositoryRef) -> Result<String>;

    /// Full recursive tree of `revision`, with normalized paths
    async fn revision_tree(&self, repo: &RepositoryRef, revision: &str) -> Result<RevisionTree>;

    /// Read one blob by path
    async fn read_file(&self, repo: &RepositoryRef, path: &str) -> Result<FileContent>;

    /// Create or replace one blob.
    ///
    /// The remote enforces `request.sha` as a compare-and-swap precondition;
    /// a mismatch surfaces as
    /// [`SyncError::ConcurrencyConflict`](crate::SyncError::ConcurrencyConflict).
    async fn write_file(&self, repo: &RepositoryRef, request: &WriteFileRequest) -> Result<WriteReceipt>;
}
