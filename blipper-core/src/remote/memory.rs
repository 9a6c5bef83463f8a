//! In-memory source control with a full revision history.
//!
//! Writes obey the same compare-and-swap rule as the hosted service: replacing
//! an existing file requires the sha of its current content, and creating a
//! file requires that none exists.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::SourceControl;
use crate::error::{Result, SyncError};
use crate::model::{
    CurrentUser, EntryKind, FileContent, RepositoryRef, RepositorySummary, RevisionTree,
    TreeEntry, WriteFileRequest, WriteReceipt,
};
use crate::paths;
use crate::token::TokenStore;

/// Git blob hash of `content`: SHA-1 over `blob {len}\0{content}`.
pub fn blob_sha(content: &[u8]) -> String {
    object_sha("blob", content)
}

fn object_sha(kind: &str, content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{} {}\0", kind, content.len()).as_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
struct Revision {
    sha: String,
    files: BTreeMap<String, Vec<u8>>,
}

impl Revision {
    fn tree(&self) -> RevisionTree {
        let mut directories = BTreeSet::new();
        for path in self.files.keys() {
            let mut dir = paths::parent(path);
            while dir != paths::ROOT && directories.insert(dir.to_string()) {
                dir = paths::parent(dir);
            }
        }

        let mut entries: Vec<TreeEntry> = directories
            .iter()
            .map(|dir| {
                let listing: String = self
                    .files
                    .iter()
                    .filter(|(path, _)| path.starts_with(&format!("{}/", dir)))
                    .map(|(path, content)| format!("{} {}\n", path, blob_sha(content)))
                    .collect();
                TreeEntry::new(dir, EntryKind::Tree, object_sha("tree", listing.as_bytes()))
            })
            .collect();
        entries.extend(
            self.files
                .iter()
                .map(|(path, content)| TreeEntry::new(path, EntryKind::Blob, blob_sha(content))),
        );
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        RevisionTree::new(self.sha.clone(), entries)
    }
}

#[derive(Debug)]
struct MemoryRepository {
    id: u64,
    revisions: Vec<Revision>,
}

impl MemoryRepository {
    fn head(&self) -> Option<&Revision> {
        self.revisions.last()
    }

    fn commit(&mut self, files: BTreeMap<String, Vec<u8>>, message: &str) -> String {
        let parent = self.head().map(|r| r.sha.as_str()).unwrap_or("");
        let mut body = format!("parent {}\nmessage {}\n", parent, message);
        for (path, content) in &files {
            body.push_str(&format!("{} {}\n", path, blob_sha(content)));
        }
        let sha = object_sha("commit", body.as_bytes());
        self.revisions.push(Revision {
            sha: sha.clone(),
            files,
        });
        sha
    }
}

#[derive(Debug)]
struct MemoryState {
    user: CurrentUser,
    repositories: BTreeMap<String, MemoryRepository>,
    next_id: u64,
    offline: bool,
    requests: usize,
}

/// [`SourceControl`] backed by process memory
pub struct MemoryRemote {
    tokens: Arc<dyn TokenStore>,
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    /// Create a remote whose authenticated user is `login`.
    pub fn new(tokens: Arc<dyn TokenStore>, login: &str) -> Self {
        Self {
            tokens,
            state: Mutex::new(MemoryState {
                user: CurrentUser {
                    id: 1,
                    login: login.to_string(),
                },
                repositories: BTreeMap::new(),
                next_id: 1,
                offline: false,
                requests: 0,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| SyncError::Storage("memory remote lock poisoned".to_string()))
    }

    /// Token check, then connectivity check. Counts as one request.
    fn begin(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.tokens.token().ok_or(SyncError::MissingCredential)?;
        let mut state = self.lock()?;
        if state.offline {
            return Err(SyncError::Transport("remote is offline".to_string()));
        }
        state.requests += 1;
        Ok(state)
    }

    /// Create a repository with one initial, empty revision.
    pub fn create_repository(&self, repo: &RepositoryRef) -> Result<()> {
        let mut state = self.lock()?;
        let id = state.next_id;
        state.next_id += 1;
        let mut repository = MemoryRepository {
            id,
            revisions: Vec::new(),
        };
        repository.commit(BTreeMap::new(), "initial commit");
        state.repositories.insert(repo.to_string(), repository);
        Ok(())
    }

    /// Create a repository that has no revisions at all.
    pub fn create_empty_repository(&self, repo: &RepositoryRef) -> Result<()> {
        let mut state = self.lock()?;
        let id = state.next_id;
        state.next_id += 1;
        state.repositories.insert(
            repo.to_string(),
            MemoryRepository {
                id,
                revisions: Vec::new(),
            },
        );
        Ok(())
    }

    /// Commit `content` at `path` unconditionally, as another client would.
    /// Returns the new blob sha.
    pub fn put_file(&self, repo: &RepositoryRef, path: &str, content: &[u8]) -> Result<String> {
        let mut state = self.lock()?;
        let repository = repository_mut(&mut state, repo)?;
        let mut files = repository.head().map(|r| r.files.clone()).unwrap_or_default();
        files.insert(paths::normalize(path), content.to_vec());
        repository.commit(files, &format!("update {}", path));
        Ok(blob_sha(content))
    }

    /// Content of `path` at the head revision.
    pub fn file(&self, repo: &RepositoryRef, path: &str) -> Option<Vec<u8>> {
        let state = self.lock().ok()?;
        let repository = state.repositories.get(&repo.to_string())?;
        repository.head()?.files.get(&paths::normalize(path)).cloned()
    }

    /// Fail every subsequent request with a transport error while `offline`.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.lock() {
            state.offline = offline;
        }
    }

    /// Number of requests that passed the credential check.
    pub fn request_count(&self) -> usize {
        self.lock().map(|s| s.requests).unwrap_or(0)
    }
}

fn repository<'a>(state: &'a MemoryState, repo: &RepositoryRef) -> Result<&'a MemoryRepository> {
    state
        .repositories
        .get(&repo.to_string())
        .ok_or_else(|| SyncError::NotFound(format!("repository {}", repo)))
}

fn repository_mut<'a>(
    state: &'a mut MemoryState,
    repo: &RepositoryRef,
) -> Result<&'a mut MemoryRepository> {
    state
        .repositories
        .get_mut(&repo.to_string())
        .ok_or_else(|| SyncError::NotFound(format!("repository {}", repo)))
}

#[async_trait]
impl SourceControl for MemoryRemote {
    async fn current_user(&self) -> Result<CurrentUser> {
        let state = self.begin()?;
        Ok(state.user.clone())
    }

    async fn list_repositories(&self) -> Result<Vec<RepositorySummary>> {
        let state = self.begin()?;
        let prefix = format!("{}/", state.user.login);
        Ok(state
            .repositories
            .iter()
            .filter(|(full_name, _)| full_name.starts_with(&prefix))
            .map(|(full_name, repository)| RepositorySummary {
                id: repository.id,
                name: full_name[prefix.len()..].to_string(),
                full_name: full_name.clone(),
                html_url: format!("https://github.com/{}", full_name),
            })
            .collect())
    }

    async fn latest_revision(&self, repo: &RepositoryRef) -> Result<String> {
        let state = self.begin()?;
        repository(&state, repo)?
            .head()
            .map(|r| r.sha.clone())
            .ok_or_else(|| SyncError::EmptyResult(format!("no revisions in {}", repo)))
    }

    async fn revision_tree(&self, repo: &RepositoryRef, revision: &str) -> Result<RevisionTree> {
        let state = self.begin()?;
        repository(&state, repo)?
            .revisions
            .iter()
            .find(|r| r.sha == revision)
            .map(Revision::tree)
            .ok_or_else(|| SyncError::NotFound(format!("revision {} of {}", revision, repo)))
    }

    async fn read_file(&self, repo: &RepositoryRef, path: &str) -> Result<FileContent> {
        let state = self.begin()?;
        let path = paths::normalize(path);
        let content = repository(&state, repo)?
            .head()
            .and_then(|r| r.files.get(&path))
            .ok_or_else(|| SyncError::NotFound(path.clone()))?;
        Ok(FileContent {
            kind: "file".to_string(),
            sha: blob_sha(content),
            content: content.clone(),
            path,
        })
    }

    async fn write_file(&self, repo: &RepositoryRef, request: &WriteFileRequest) -> Result<WriteReceipt> {
        let mut state = self.begin()?;
        let path = paths::normalize(&request.path);
        let content = BASE64
            .decode(request.content.as_bytes())
            .map_err(|e| SyncError::Rejected {
                status: 422,
                message: format!("content is not valid base64: {}", e),
            })?;

        let repository = repository_mut(&mut state, repo)?;
        let mut files = repository.head().map(|r| r.files.clone()).unwrap_or_default();
        let current = files.get(&path).map(|c| blob_sha(c));
        if current != request.sha {
            debug!(
                "Rejecting write to {}: expected {:?}, found {:?}",
                path, request.sha, current
            );
            return Err(SyncError::ConcurrencyConflict { path });
        }

        let sha = blob_sha(&content);
        files.insert(path.clone(), content);
        repository.commit(files, &request.message);
        Ok(WriteReceipt {
            path,
            sha: Some(sha),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::MemoryTokenStore;

    fn remote() -> (MemoryRemote, RepositoryRef) {
        let remote = MemoryRemote::new(Arc::new(MemoryTokenStore::with_token("t")), "octo");
        let repo = RepositoryRef::new("octo", "blog");
        remote.create_repository(&repo).unwrap();
        (remote, repo)
    }

    fn write(path: &str, content: &str, sha: Option<String>) -> WriteFileRequest {
        WriteFileRequest {
            path: path.to_string(),
            message: "test".to_string(),
            content: BASE64.encode(content),
            sha,
            branch: None,
        }
    }

    #[test]
    fn test_blob_sha_matches_git() {
        // `git hash-object` of an empty file
        assert_eq!(blob_sha(b""), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (remote, repo) = remote();
        let receipt = remote
            .write_file(&repo, &write("posts/a.mdx", "hello", None))
            .await
            .unwrap();
        assert_eq!(receipt.path, "/posts/a.mdx");

        let file = remote.read_file(&repo, "/posts/a.mdx").await.unwrap();
        assert_eq!(file.content, b"hello");
        assert_eq!(Some(file.sha), receipt.sha);
    }

    #[tokio::test]
    async fn test_tree_lists_intermediate_directories() {
        let (remote, repo) = remote();
        remote.put_file(&repo, "/a/b/c.txt", b"x").unwrap();
        let head = remote.latest_revision(&repo).await.unwrap();
        let tree = remote.revision_tree(&repo, &head).await.unwrap();
        assert!(tree.has_directory("/a"));
        assert!(tree.has_directory("/a/b"));
        assert!(tree.get("/a/b/c.txt").is_some_and(|e| e.is_blob()));
    }

    #[tokio::test]
    async fn test_stale_sha_conflicts() {
        let (remote, repo) = remote();
        let first = remote.put_file(&repo, "/x.txt", b"one").unwrap();
        remote.put_file(&repo, "/x.txt", b"two").unwrap();

        let err = remote
            .write_file(&repo, &write("/x.txt", "three", Some(first)))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "concurrency-conflict");

        let err = remote
            .write_file(&repo, &write("/x.txt", "three", None))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "concurrency-conflict");
        assert_eq!(remote.file(&repo, "/x.txt").unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_missing_token_makes_no_request() {
        let remote = MemoryRemote::new(Arc::new(MemoryTokenStore::new()), "octo");
        assert_eq!(
            remote.current_user().await.unwrap_err(),
            SyncError::MissingCredential
        );
        assert_eq!(remote.request_count(), 0);
    }

    #[tokio::test]
    async fn test_repository_without_revisions() {
        let remote = MemoryRemote::new(Arc::new(MemoryTokenStore::with_token("t")), "octo");
        let repo = RepositoryRef::new("octo", "void");
        remote.create_empty_repository(&repo).unwrap();
        let err = remote.latest_revision(&repo).await.unwrap_err();
        assert_eq!(err.category(), "empty-result");
    }
}
