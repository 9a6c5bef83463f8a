//! GitHub REST API client.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::SourceControl;
use crate::config::BlipperConfig;
use crate::error::{Result, SyncError};
use crate::model::{
    CurrentUser, EntryKind, FileContent, RepositoryRef, RepositorySummary, RevisionTree,
    TreeEntry, WriteFileRequest, WriteReceipt,
};
use crate::paths;
use crate::token::TokenStore;
use crate::transport::{ApiTransport, HttpTransport, ReqwestTransport};

/// Value of the `X-GitHub-Api-Version` header.
pub const GITHUB_API_VERSION: &str = "2022-11-28";

const API_VERSION_HEADER: &str = "x-github-api-version";
const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";
const CLIENT_USER_AGENT: &str = concat!("blipper/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct CommitMarker {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    sha: String,
    tree: Vec<RawTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct RawTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: EntryKind,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    sha: String,
    content: String,
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    content: UpsertContent,
}

#[derive(Debug, Deserialize)]
struct UpsertContent {
    #[allow(dead_code)]
    name: String,
    path: String,
    #[serde(default)]
    sha: Option<String>,
}

/// 409 is a hash mismatch. 422 is only a conflict when it complains about
/// the `sha` field; other validation failures stay rejections.
fn is_write_conflict(status: u16, message: &str) -> bool {
    match status {
        409 => true,
        422 => message.contains("sha"),
        _ => false,
    }
}

/// [`SourceControl`] implementation for the GitHub REST API
pub struct GitHubClient {
    api: ApiTransport,
    tokens: Arc<dyn TokenStore>,
    base_url: Url,
}

impl GitHubClient {
    /// Create a client over an arbitrary transport.
    pub fn new(
        http: Arc<dyn HttpTransport>,
        tokens: Arc<dyn TokenStore>,
        base_url: &str,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SyncError::Transport(format!("invalid API base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Transport(format!(
                "API base URL '{}' cannot carry a path",
                base_url
            )));
        }
        Ok(Self {
            api: ApiTransport::new(http),
            tokens,
            base_url,
        })
    }

    /// Create a reqwest-backed client from configuration.
    pub fn from_config(config: &BlipperConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let http = ReqwestTransport::new(Duration::from_secs(config.request_timeout_secs))?;
        Self::new(Arc::new(http), tokens, &config.api_base_url)
    }

    /// Authenticated headers, or `MissingCredential` without any I/O.
    fn headers(&self) -> Result<HeaderMap> {
        let token = self.tokens.token().ok_or(SyncError::MissingCredential)?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| SyncError::Transport("stored token is not a valid header value".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_GITHUB_JSON));
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(GITHUB_API_VERSION));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        Ok(headers)
    }

    /// Build an endpoint URL; each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.extend(segment.split('/').filter(|s| !s.is_empty()));
            }
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url.to_string()
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str, headers: HeaderMap) -> Result<T> {
        self.api
            .request_json::<T, ()>(Method::GET, url, None, headers)
            .await
    }
}

#[async_trait]
impl SourceControl for GitHubClient {
    async fn current_user(&self) -> Result<CurrentUser> {
        let headers = self.headers()?;
        self.get(&self.endpoint(&["user"], &[]), headers).await
    }

    async fn list_repositories(&self) -> Result<Vec<RepositorySummary>> {
        let headers = self.headers()?;
        let mut repositories = Vec::new();

        for page in 1u32.. {
            let page_str = page.to_string();
            let url = self.endpoint(&["user", "repos"], &[("page", page_str.as_str()), ("type", "owner")]);
            let batch: Vec<RepositorySummary> = self.get(&url, headers.clone()).await?;
            debug!("Repository page {}: {} items", page, batch.len());
            if batch.is_empty() {
                break;
            }
            repositories.extend(batch);
        }

        info!("Listed {} owned repositories", repositories.len());
        Ok(repositories)
    }

    async fn latest_revision(&self, repo: &RepositoryRef) -> Result<String> {
        let headers = self.headers()?;
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "commits"], &[("per_page", "1")]);
        let commits: Vec<CommitMarker> = match self.get(&url, headers).await {
            Ok(commits) => commits,
            // GitHub answers 409 for a repository without any commits.
            Err(SyncError::Rejected { status: 409, .. }) => Vec::new(),
            Err(SyncError::Rejected { status: 404, .. }) => {
                return Err(SyncError::NotFound(format!("repository {}", repo)));
            }
            Err(e) => return Err(e),
        };
        commits
            .into_iter()
            .next()
            .map(|c| c.sha)
            .ok_or_else(|| SyncError::EmptyResult(format!("no revisions in {}", repo)))
    }

    async fn revision_tree(&self, repo: &RepositoryRef, revision: &str) -> Result<RevisionTree> {
        let headers = self.headers()?;
        let url = self.endpoint(
            &["repos", &repo.owner, &repo.name, "git", "trees", revision],
            &[("recursive", "true")],
        );
        let response: TreeResponse = self.get(&url, headers).await.map_err(|e| match e {
            SyncError::Rejected { status: 404, .. } => {
                SyncError::NotFound(format!("revision {} of {}", revision, repo))
            }
            other => other,
        })?;

        if response.truncated {
            warn!(
                "Tree listing for {} at {} was truncated by the remote ({} entries)",
                repo,
                revision,
                response.tree.len()
            );
        }

        let entries = response
            .tree
            .into_iter()
            .map(|e| TreeEntry::new(&e.path, e.kind, e.sha))
            .collect();
        Ok(RevisionTree {
            sha: response.sha,
            entries,
            truncated: response.truncated,
        })
    }

    async fn read_file(&self, repo: &RepositoryRef, path: &str) -> Result<FileContent> {
        let headers = self.headers()?;
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "contents", paths::to_remote(path)], &[]);
        let file: FileResponse = self.get(&url, headers).await.map_err(|e| match e {
            SyncError::Rejected { status: 404, .. } => SyncError::NotFound(paths::normalize(path)),
            other => other,
        })?;

        if file.encoding != "base64" {
            return Err(SyncError::ShapeInvalid(format!(
                "{} has unsupported encoding '{}'",
                file.path, file.encoding
            )));
        }
        let encoded: String = file.content.chars().filter(|c| !c.is_whitespace()).collect();
        let content = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| SyncError::Decode(format!("{}: {}", file.path, e)))?;

        Ok(FileContent {
            kind: file.kind,
            path: paths::normalize(&file.path),
            sha: file.sha,
            content,
        })
    }

    async fn write_file(&self, repo: &RepositoryRef, request: &WriteFileRequest) -> Result<WriteReceipt> {
        let headers = self.headers()?;
        let url = self.endpoint(
            &["repos", &repo.owner, &repo.name, "contents", paths::to_remote(&request.path)],
            &[],
        );
        let response: UpsertResponse = self
            .api
            .request_json(Method::PUT, &url, Some(request), headers)
            .await
            .map_err(|e| match e {
                SyncError::Rejected { status, message } if is_write_conflict(status, &message) => {
                    SyncError::ConcurrencyConflict {
                        path: paths::normalize(&request.path),
                    }
                }
                SyncError::Rejected { status: 404, .. } => {
                    SyncError::NotFound(format!("repository {}", repo))
                }
                other => other,
            })?;

        info!("Wrote {} to {}", response.content.path, repo);
        Ok(WriteReceipt {
            path: paths::normalize(&response.content.path),
            sha: response.content.sha,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::MemoryTokenStore;
    use crate::transport::{HttpRequest, HttpResponse};

    struct Unreachable;

    #[async_trait]
    impl HttpTransport for Unreachable {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse> {
            Err(SyncError::Transport("unreachable".to_string()))
        }
    }

    fn client(base: &str) -> GitHubClient {
        GitHubClient::new(
            Arc::new(Unreachable),
            Arc::new(MemoryTokenStore::with_token("t")),
            base,
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_encodes_segments_and_query() {
        let client = client("https://api.github.com");
        assert_eq!(
            client.endpoint(&["repos", "octo", "blog", "contents", "posts/a b.mdx"], &[]),
            "https://api.github.com/repos/octo/blog/contents/posts/a%20b.mdx"
        );
        assert_eq!(
            client.endpoint(&["user", "repos"], &[("page", "2"), ("type", "owner")]),
            "https://api.github.com/user/repos?page=2&type=owner"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = client("https://ghe.example.com/api/v3/");
        assert_eq!(
            client.endpoint(&["user"], &[]),
            "https://ghe.example.com/api/v3/user"
        );
    }

    #[test]
    fn test_headers_require_token() {
        let client = GitHubClient::new(
            Arc::new(Unreachable),
            Arc::new(MemoryTokenStore::new()),
            "https://api.github.com",
        )
        .unwrap();
        assert_eq!(client.headers().unwrap_err(), SyncError::MissingCredential);
    }
}
