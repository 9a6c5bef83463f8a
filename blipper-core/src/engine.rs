//! Content sync engine
//!
//! A single-writer state machine over one repository. Intents are synchronous
//! and either move the engine to a new [`SyncState`] or return an error and
//! leave it untouched. Remote calls and image encoding are [`PendingOp`]s:
//! each one captures the generation of the state it was issued against, and
//! [`ContentSyncEngine::apply`] drops any [`Completion`] whose generation is
//! no longer current.
//!
//! ```text
//! LoadingRepository ──▶ RepositoryLoaded ──▶ LoadEntry ──▶ EditEntry ──▶ SaveEntry
//!        │                 │      ▲              │            ▲  │           │
//!        ▼                 │      └── reload ────┘            │  ▼           ▼
//! RepositoryLoadingFailure │                    LoadEntryFailure  SaveEntryFailure
//!                          └── encode ──▶ SaveAsset ◀──▶ SaveAssetFailure
//! ```

use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::asset::{AssetInput, EncodeOptions, EncodedImage, encode_image};
use crate::config::BlipperConfig;
use crate::error::{Result, SyncError};
use crate::model::{
    AssetDraft, DraftContent, EditableDraft, EntryKind, FileContent, RepositoryRef, RevisionTree,
    WriteFileRequest, WriteReceipt,
};
use crate::paths;
use crate::preferences::{
    IMAGES_DIRECTORY_KEY, POSTS_DIRECTORY_KEY, PreferenceStore, REPOSITORY_KEY,
};
use crate::remote::SourceControl;

/// The selected posts and images base directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directories {
    pub posts: String,
    pub images: String,
}

impl Directories {
    pub fn new(posts: &str, images: &str) -> Self {
        Self {
            posts: paths::normalize(posts),
            images: paths::normalize(images),
        }
    }

    /// Keep each directory only if it exists in `tree`, else fall back to the
    /// root. The two are checked independently.
    fn validated(&self, tree: &RevisionTree) -> Self {
        let check = |dir: &str, kind: &str| {
            if tree.has_directory(dir) {
                dir.to_string()
            } else {
                info!("{} directory {} is not in the tree, using /", kind, dir);
                paths::ROOT.to_string()
            }
        };
        Self {
            posts: check(&self.posts, "Posts"),
            images: check(&self.images, "Images"),
        }
    }
}

/// Engine state; one variant per workflow step
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    LoadingRepository {
        directories: Directories,
    },
    RepositoryLoadingFailure {
        error: SyncError,
        directories: Directories,
    },
    RepositoryLoaded {
        directories: Directories,
        tree: Arc<RevisionTree>,
    },
    LoadEntry {
        path: String,
        directories: Directories,
        tree: Arc<RevisionTree>,
    },
    LoadEntryFailure {
        path: String,
        error: SyncError,
        directories: Directories,
        tree: Arc<RevisionTree>,
    },
    EditEntry {
        draft: EditableDraft,
        directories: Directories,
        tree: Arc<RevisionTree>,
    },
    SaveEntry {
        draft: EditableDraft,
        directories: Directories,
        tree: Arc<RevisionTree>,
    },
    SaveEntryFailure {
        draft: EditableDraft,
        error: SyncError,
        directories: Directories,
        tree: Arc<RevisionTree>,
    },
    SaveAsset {
        asset: AssetDraft,
        directories: Directories,
        tree: Arc<RevisionTree>,
    },
    /// `asset` is `None` when encoding failed before a draft existed.
    SaveAssetFailure {
        asset: Option<AssetDraft>,
        error: SyncError,
        directories: Directories,
        tree: Arc<RevisionTree>,
    },
}

impl SyncState {
    pub fn name(&self) -> &'static str {
        match self {
            SyncState::LoadingRepository { .. } => "loading-repository",
            SyncState::RepositoryLoadingFailure { .. } => "repository-loading-failure",
            SyncState::RepositoryLoaded { .. } => "repository-loaded",
            SyncState::LoadEntry { .. } => "load-entry",
            SyncState::LoadEntryFailure { .. } => "load-entry-failure",
            SyncState::EditEntry { .. } => "edit-entry",
            SyncState::SaveEntry { .. } => "save-entry",
            SyncState::SaveEntryFailure { .. } => "save-entry-failure",
            SyncState::SaveAsset { .. } => "save-asset",
            SyncState::SaveAssetFailure { .. } => "save-asset-failure",
        }
    }

    pub fn directories(&self) -> &Directories {
        match self {
            SyncState::LoadingRepository { directories }
            | SyncState::RepositoryLoadingFailure { directories, .. }
            | SyncState::RepositoryLoaded { directories, .. }
            | SyncState::LoadEntry { directories, .. }
            | SyncState::LoadEntryFailure { directories, .. }
            | SyncState::EditEntry { directories, .. }
            | SyncState::SaveEntry { directories, .. }
            | SyncState::SaveEntryFailure { directories, .. }
            | SyncState::SaveAsset { directories, .. }
            | SyncState::SaveAssetFailure { directories, .. } => directories,
        }
    }

    /// Tree of the last successful load, if any.
    pub fn tree(&self) -> Option<&Arc<RevisionTree>> {
        match self {
            SyncState::LoadingRepository { .. } | SyncState::RepositoryLoadingFailure { .. } => None,
            SyncState::RepositoryLoaded { tree, .. }
            | SyncState::LoadEntry { tree, .. }
            | SyncState::LoadEntryFailure { tree, .. }
            | SyncState::EditEntry { tree, .. }
            | SyncState::SaveEntry { tree, .. }
            | SyncState::SaveEntryFailure { tree, .. }
            | SyncState::SaveAsset { tree, .. }
            | SyncState::SaveAssetFailure { tree, .. } => Some(tree),
        }
    }

    pub fn draft(&self) -> Option<&EditableDraft> {
        match self {
            SyncState::EditEntry { draft, .. }
            | SyncState::SaveEntry { draft, .. }
            | SyncState::SaveEntryFailure { draft, .. } => Some(draft),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            SyncState::RepositoryLoadingFailure { error, .. }
            | SyncState::LoadEntryFailure { error, .. }
            | SyncState::SaveEntryFailure { error, .. }
            | SyncState::SaveAssetFailure { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Whether this state has no work in flight.
    pub fn is_settled(&self) -> bool {
        !matches!(
            self,
            SyncState::LoadingRepository { .. }
                | SyncState::LoadEntry { .. }
                | SyncState::SaveEntry { .. }
                | SyncState::SaveAsset { .. }
        )
    }
}

#[derive(Debug, Clone)]
enum OpKind {
    LoadRepository {
        repository: RepositoryRef,
    },
    ReadFile {
        repository: RepositoryRef,
        path: String,
    },
    WriteEntry {
        repository: RepositoryRef,
        request: WriteFileRequest,
    },
    WriteAsset {
        repository: RepositoryRef,
        request: WriteFileRequest,
    },
    EncodeAsset {
        input: AssetInput,
        options: EncodeOptions,
        date: NaiveDate,
    },
}

/// An asynchronous step issued against one engine generation
#[derive(Debug, Clone)]
pub struct PendingOp {
    generation: u64,
    kind: OpKind,
}

#[derive(Debug)]
enum Outcome {
    RepositoryLoaded(Result<RevisionTree>),
    EntryRead(Result<FileContent>),
    EntryWritten(Result<WriteReceipt>),
    AssetWritten(Result<WriteReceipt>),
    AssetEncoded { date: NaiveDate, result: Result<EncodedImage> },
}

/// The result of a [`PendingOp`], tagged with the generation it was issued at
#[derive(Debug)]
pub struct Completion {
    generation: u64,
    outcome: Outcome,
}

impl Completion {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl PendingOp {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn describe(&self) -> &'static str {
        match self.kind {
            OpKind::LoadRepository { .. } => "load repository",
            OpKind::ReadFile { .. } => "read file",
            OpKind::WriteEntry { .. } => "write entry",
            OpKind::WriteAsset { .. } => "write asset",
            OpKind::EncodeAsset { .. } => "encode asset",
        }
    }

    /// Perform the operation. Failures are carried inside the completion.
    pub async fn run(self, remote: &dyn SourceControl) -> Completion {
        let outcome = match self.kind {
            OpKind::LoadRepository { repository } => {
                let result = match remote.latest_revision(&repository).await {
                    Ok(revision) => remote.revision_tree(&repository, &revision).await,
                    Err(e) => Err(e),
                };
                Outcome::RepositoryLoaded(result)
            }
            OpKind::ReadFile { repository, path } => {
                Outcome::EntryRead(remote.read_file(&repository, &path).await)
            }
            OpKind::WriteEntry { repository, request } => {
                Outcome::EntryWritten(remote.write_file(&repository, &request).await)
            }
            OpKind::WriteAsset { repository, request } => {
                Outcome::AssetWritten(remote.write_file(&repository, &request).await)
            }
            OpKind::EncodeAsset {
                input,
                options,
                date,
            } => {
                let result = tokio::task::spawn_blocking(move || encode_image(&input, &options))
                    .await
                    .unwrap_or_else(|e| Err(SyncError::Encode(format!("encoder task failed: {}", e))));
                Outcome::AssetEncoded { date, result }
            }
        };
        Completion {
            generation: self.generation,
            outcome,
        }
    }
}

/// Edit/publish workflow for one repository
pub struct ContentSyncEngine {
    remote: Arc<dyn SourceControl>,
    preferences: Arc<dyn PreferenceStore>,
    repository: RepositoryRef,
    config: BlipperConfig,
    state: SyncState,
    generation: u64,
}

impl ContentSyncEngine {
    /// Create an engine in `LoadingRepository`.
    ///
    /// Remembered directories are read here, once; they fall back to the
    /// configured defaults.
    pub fn new(
        remote: Arc<dyn SourceControl>,
        preferences: Arc<dyn PreferenceStore>,
        repository: RepositoryRef,
        config: BlipperConfig,
    ) -> Self {
        let posts = preferences
            .get(POSTS_DIRECTORY_KEY)
            .unwrap_or_else(|| config.default_posts_directory.clone());
        let images = preferences
            .get(IMAGES_DIRECTORY_KEY)
            .unwrap_or_else(|| config.default_images_directory.clone());
        let directories = Directories::new(&posts, &images);
        debug!("Initial directories for {}: {:?}", repository, directories);

        Self {
            remote,
            preferences,
            repository,
            config,
            state: SyncState::LoadingRepository { directories },
            generation: 0,
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn repository(&self) -> &RepositoryRef {
        &self.repository
    }

    pub fn config(&self) -> &BlipperConfig {
        &self.config
    }

    fn transition(&mut self, next: SyncState) {
        info!("{}: {} -> {}", self.repository, self.state.name(), next.name());
        self.state = next;
        self.generation += 1;
        if let SyncState::RepositoryLoaded { directories, .. } = &self.state {
            self.remember(directories.clone());
        }
    }

    fn remember(&self, directories: Directories) {
        let repository = self.repository.to_string();
        for (key, value) in [
            (POSTS_DIRECTORY_KEY, directories.posts.as_str()),
            (IMAGES_DIRECTORY_KEY, directories.images.as_str()),
            (REPOSITORY_KEY, repository.as_str()),
        ] {
            if let Err(e) = self.preferences.set(key, value) {
                warn!("Failed to remember {}: {}", key, e);
            }
        }
    }

    fn invalid(&self, intent: &'static str) -> SyncError {
        SyncError::InvalidIntent {
            intent,
            state: self.state.name(),
        }
    }

    fn op(&self, kind: OpKind) -> PendingOp {
        PendingOp {
            generation: self.generation,
            kind,
        }
    }

    fn write_request(&self, path: &str, content: String, sha: Option<String>, message: &str) -> WriteFileRequest {
        WriteFileRequest {
            path: path.to_string(),
            message: message.to_string(),
            content,
            sha,
            branch: self.config.branch.clone(),
        }
    }

    /// The operation the current state is waiting on, if any.
    pub fn pending(&self) -> Option<PendingOp> {
        let repository = self.repository.clone();
        let kind = match &self.state {
            SyncState::LoadingRepository { .. } => OpKind::LoadRepository { repository },
            SyncState::LoadEntry { path, .. } => OpKind::ReadFile {
                repository,
                path: path.clone(),
            },
            SyncState::SaveEntry { draft, .. } => OpKind::WriteEntry {
                repository,
                request: self.write_request(
                    &draft.path,
                    draft.content.to_base64(),
                    draft.sha.clone(),
                    &self.config.entry_commit_message,
                ),
            },
            SyncState::SaveAsset { asset, .. } => OpKind::WriteAsset {
                repository,
                request: self.write_request(
                    &asset.path,
                    asset.base64.clone(),
                    None,
                    &self.config.asset_commit_message,
                ),
            },
            _ => return None,
        };
        Some(self.op(kind))
    }

    /// Apply a completion. Returns `false` and changes nothing when the
    /// completion was issued against an earlier generation.
    pub fn apply(&mut self, completion: Completion) -> bool {
        if completion.generation != self.generation {
            debug!(
                "Dropping stale completion (issued at {}, now {})",
                completion.generation, self.generation
            );
            return false;
        }

        let next = match (&self.state, completion.outcome) {
            (SyncState::LoadingRepository { directories }, Outcome::RepositoryLoaded(result)) => {
                match result {
                    Ok(tree) => SyncState::RepositoryLoaded {
                        directories: directories.validated(&tree),
                        tree: Arc::new(tree),
                    },
                    Err(error) => SyncState::RepositoryLoadingFailure {
                        error,
                        directories: directories.clone(),
                    },
                }
            }
            (
                SyncState::LoadEntry {
                    path,
                    directories,
                    tree,
                },
                Outcome::EntryRead(result),
            ) => match result {
                Ok(file) => SyncState::EditEntry {
                    draft: EditableDraft::from_file(file),
                    directories: directories.clone(),
                    tree: Arc::clone(tree),
                },
                Err(error) => SyncState::LoadEntryFailure {
                    path: path.clone(),
                    error,
                    directories: directories.clone(),
                    tree: Arc::clone(tree),
                },
            },
            (
                SyncState::SaveEntry {
                    draft,
                    directories,
                    tree,
                },
                Outcome::EntryWritten(result),
            ) => match result {
                Ok(receipt) => {
                    info!("Saved {}", receipt.path);
                    SyncState::LoadingRepository {
                        directories: directories.clone(),
                    }
                }
                Err(error) => SyncState::SaveEntryFailure {
                    draft: draft.clone(),
                    error,
                    directories: directories.clone(),
                    tree: Arc::clone(tree),
                },
            },
            (
                SyncState::SaveAsset {
                    asset,
                    directories,
                    tree,
                },
                Outcome::AssetWritten(result),
            ) => match result {
                Ok(receipt) => {
                    info!("Uploaded {}", receipt.path);
                    SyncState::LoadingRepository {
                        directories: directories.clone(),
                    }
                }
                Err(error) => SyncState::SaveAssetFailure {
                    asset: Some(asset.clone()),
                    error,
                    directories: directories.clone(),
                    tree: Arc::clone(tree),
                },
            },
            (
                SyncState::RepositoryLoaded { directories, tree },
                Outcome::AssetEncoded { date, result },
            ) => match result {
                Ok(image) => {
                    let prefix = paths::dated_prefix(&directories.images, date);
                    let existing = tree.count_sequenced(&prefix, image.extension);
                    SyncState::SaveAsset {
                        asset: AssetDraft {
                            path: paths::sequenced_name(&prefix, existing, image.extension),
                            base64: image.base64,
                        },
                        directories: directories.clone(),
                        tree: Arc::clone(tree),
                    }
                }
                Err(error) => SyncState::SaveAssetFailure {
                    asset: None,
                    error,
                    directories: directories.clone(),
                    tree: Arc::clone(tree),
                },
            },
            (state, outcome) => {
                warn!("Completion {:?} does not match state {}", outcome, state.name());
                return false;
            }
        };

        self.transition(next);
        true
    }

    /// Run the pending operation, if any, and apply its completion.
    pub async fn step(&mut self) -> bool {
        let Some(op) = self.pending() else {
            return false;
        };
        debug!("Running {} at generation {}", op.describe(), op.generation());
        let remote = Arc::clone(&self.remote);
        let completion = op.run(remote.as_ref()).await;
        self.apply(completion)
    }

    /// Step until the engine reaches a state with no pending operation.
    pub async fn settle(&mut self) -> &SyncState {
        while self.step().await {}
        &self.state
    }

    /// Start a new entry dated today.
    pub fn create_entry(&mut self) -> Result<()> {
        self.create_entry_on(Local::now().date_naive())
    }

    /// Start a new entry dated `date` at the next free sequence number.
    pub fn create_entry_on(&mut self, date: NaiveDate) -> Result<()> {
        let SyncState::RepositoryLoaded { directories, tree } = &self.state else {
            return Err(self.invalid("create-entry"));
        };
        let extension = &self.config.entry_extension;
        let prefix = paths::dated_prefix(&directories.posts, date);
        let existing = tree.count_sequenced(&prefix, extension);
        let path = paths::sequenced_name(&prefix, existing, extension);
        let template = format!("---\npubDate: {}\n---\n", date.format("%b %d, %Y"));

        let next = SyncState::EditEntry {
            draft: EditableDraft::new_file(&path, DraftContent::Text(template)),
            directories: directories.clone(),
            tree: Arc::clone(tree),
        };
        self.transition(next);
        Ok(())
    }

    /// Start loading an existing entry.
    pub fn open_entry(&mut self, path: &str) -> Result<()> {
        let SyncState::RepositoryLoaded { directories, tree } = &self.state else {
            return Err(self.invalid("open-entry"));
        };
        let next = SyncState::LoadEntry {
            path: paths::normalize(path),
            directories: directories.clone(),
            tree: Arc::clone(tree),
        };
        self.transition(next);
        Ok(())
    }

    fn draft_mut(&mut self, intent: &'static str) -> Result<&mut EditableDraft> {
        let invalid = self.invalid(intent);
        match &mut self.state {
            SyncState::EditEntry { draft, .. } | SyncState::SaveEntryFailure { draft, .. } => Ok(draft),
            _ => Err(invalid),
        }
    }

    /// Rename the draft. Local only.
    ///
    /// A new path takes its hash from the loaded tree, so renaming an
    /// existing file onto a free path writes it as a new file.
    pub fn set_draft_path(&mut self, path: &str) -> Result<()> {
        let invalid = self.invalid("set-draft-path");
        let path = paths::normalize(path);
        match &mut self.state {
            SyncState::EditEntry { draft, tree, .. }
            | SyncState::SaveEntryFailure { draft, tree, .. } => {
                if draft.path != path {
                    draft.sha = tree
                        .get(&path)
                        .filter(|e| e.kind == EntryKind::Blob)
                        .map(|e| e.sha.clone());
                    draft.path = path;
                }
                Ok(())
            }
            _ => Err(invalid),
        }
    }

    /// Replace the draft's content. Local only.
    pub fn set_draft_content(&mut self, content: DraftContent) -> Result<()> {
        self.draft_mut("set-draft-content")?.content = content;
        Ok(())
    }

    /// Discard the draft or failed upload and resync.
    pub fn cancel(&mut self) -> Result<()> {
        match &self.state {
            SyncState::EditEntry { directories, .. }
            | SyncState::SaveEntryFailure { directories, .. }
            | SyncState::SaveAssetFailure { directories, .. } => {
                let directories = directories.clone();
                self.transition(SyncState::LoadingRepository { directories });
                Ok(())
            }
            _ => Err(self.invalid("cancel")),
        }
    }

    /// Save the draft, or retry a failed save.
    pub fn save_entry(&mut self) -> Result<()> {
        match &self.state {
            SyncState::EditEntry {
                draft,
                directories,
                tree,
            }
            | SyncState::SaveEntryFailure {
                draft,
                directories,
                tree,
                ..
            } => {
                let next = SyncState::SaveEntry {
                    draft: draft.clone(),
                    directories: directories.clone(),
                    tree: Arc::clone(tree),
                };
                self.transition(next);
                Ok(())
            }
            _ => Err(self.invalid("save-entry")),
        }
    }

    /// Retry a failed asset upload.
    pub fn save_asset(&mut self) -> Result<()> {
        let SyncState::SaveAssetFailure {
            asset: Some(asset),
            directories,
            tree,
            ..
        } = &self.state
        else {
            return Err(self.invalid("save-asset"));
        };
        let next = SyncState::SaveAsset {
            asset: asset.clone(),
            directories: directories.clone(),
            tree: Arc::clone(tree),
        };
        self.transition(next);
        Ok(())
    }

    pub fn select_posts_directory(&mut self, dir: &str) -> Result<()> {
        self.select_directory("select-posts-directory", dir, |d, dir| d.posts = dir)
    }

    pub fn select_images_directory(&mut self, dir: &str) -> Result<()> {
        self.select_directory("select-images-directory", dir, |d, dir| d.images = dir)
    }

    fn select_directory(
        &mut self,
        intent: &'static str,
        dir: &str,
        assign: impl FnOnce(&mut Directories, String),
    ) -> Result<()> {
        let SyncState::RepositoryLoaded { directories, tree } = &self.state else {
            return Err(self.invalid(intent));
        };
        let dir = paths::normalize(dir);
        if !tree.has_directory(&dir) {
            return Err(SyncError::UnknownDirectory(dir));
        }
        let mut directories = directories.clone();
        assign(&mut directories, dir);
        let next = SyncState::RepositoryLoaded {
            directories,
            tree: Arc::clone(tree),
        };
        self.transition(next);
        Ok(())
    }

    /// Resync from any settled state.
    pub fn reload(&mut self) -> Result<()> {
        if !self.state.is_settled() {
            return Err(self.invalid("reload"));
        }
        let directories = self.state.directories().clone();
        self.transition(SyncState::LoadingRepository { directories });
        Ok(())
    }

    /// Issue an image encode against the current `RepositoryLoaded` state,
    /// dated today.
    pub fn begin_asset_upload(&self, input: AssetInput) -> Result<PendingOp> {
        self.begin_asset_upload_on(input, Local::now().date_naive())
    }

    pub fn begin_asset_upload_on(&self, input: AssetInput, date: NaiveDate) -> Result<PendingOp> {
        if !matches!(self.state, SyncState::RepositoryLoaded { .. }) {
            return Err(self.invalid("upload-asset"));
        }
        Ok(self.op(OpKind::EncodeAsset {
            input,
            options: self.config.encode_options(),
            date,
        }))
    }

    /// Encode and upload an image, then settle.
    pub async fn upload_asset(&mut self, input: AssetInput) -> Result<&SyncState> {
        let op = self.begin_asset_upload(input)?;
        let remote = Arc::clone(&self.remote);
        let completion = op.run(remote.as_ref()).await;
        self.apply(completion);
        Ok(self.settle().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::MemoryPreferenceStore;
    use crate::remote::MemoryRemote;
    use crate::token::MemoryTokenStore;
    use image::codecs::png::PngEncoder;
    use image::{ExtendedColorType, ImageEncoder};

    struct Fixture {
        remote: Arc<MemoryRemote>,
        preferences: Arc<MemoryPreferenceStore>,
        repo: RepositoryRef,
    }

    impl Fixture {
        fn new() -> Self {
            let remote = Arc::new(MemoryRemote::new(
                Arc::new(MemoryTokenStore::with_token("t")),
                "octo",
            ));
            let repo = RepositoryRef::new("octo", "blog");
            remote.create_repository(&repo).unwrap();
            Self {
                remote,
                preferences: Arc::new(MemoryPreferenceStore::new()),
                repo,
            }
        }

        fn engine(&self) -> ContentSyncEngine {
            ContentSyncEngine::new(
                self.remote.clone(),
                self.preferences.clone(),
                self.repo.clone(),
                BlipperConfig::default(),
            )
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    fn png(width: u32, height: u32) -> AssetInput {
        let pixels = vec![200u8; (width * height * 3) as usize];
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(&pixels, width, height, ExtendedColorType::Rgb8)
            .unwrap();
        AssetInput {
            bytes,
            media_type: "image/png".to_string(),
        }
    }

    #[tokio::test]
    async fn test_initial_state_is_loading() {
        let fixture = Fixture::new();
        let engine = fixture.engine();
        assert_eq!(engine.state().name(), "loading-repository");
        assert!(engine.pending().is_some());
    }

    #[tokio::test]
    async fn test_missing_directories_fall_back_independently() {
        let fixture = Fixture::new();
        fixture
            .remote
            .put_file(&fixture.repo, "/src/collections/blips/x.mdx", b"x")
            .unwrap();
        let mut engine = fixture.engine();
        engine.settle().await;

        let dirs = engine.state().directories();
        assert_eq!(dirs.posts, "/src/collections/blips");
        assert_eq!(dirs.images, "/");
        assert_eq!(
            fixture.preferences.get(IMAGES_DIRECTORY_KEY).as_deref(),
            Some("/")
        );
        assert_eq!(
            fixture.preferences.get(REPOSITORY_KEY).as_deref(),
            Some("octo/blog")
        );
    }

    #[tokio::test]
    async fn test_new_entry_template() {
        let fixture = Fixture::new();
        let mut engine = fixture.engine();
        engine.settle().await;
        engine.create_entry_on(date()).unwrap();

        let draft = engine.state().draft().unwrap();
        assert_eq!(draft.path, "/20240309_01.mdx");
        assert_eq!(draft.sha, None);
        assert_eq!(
            draft.content.as_text(),
            Some("---\npubDate: Mar 09, 2024\n---\n")
        );
    }

    #[tokio::test]
    async fn test_invalid_intent_leaves_state() {
        let fixture = Fixture::new();
        let mut engine = fixture.engine();
        let generation = engine.generation();

        let err = engine.create_entry_on(date()).unwrap_err();
        assert_eq!(
            err,
            SyncError::InvalidIntent {
                intent: "create-entry",
                state: "loading-repository"
            }
        );
        assert_eq!(engine.generation(), generation);
        assert_eq!(engine.state().name(), "loading-repository");
    }

    #[tokio::test]
    async fn test_stale_completion_is_dropped() {
        let fixture = Fixture::new();
        fixture.remote.put_file(&fixture.repo, "/a.mdx", b"a").unwrap();
        let mut engine = fixture.engine();
        engine.settle().await;

        let op = engine.begin_asset_upload_on(png(4, 4), date()).unwrap();
        engine.open_entry("/a.mdx").unwrap();
        let completion = op.run(fixture.remote.as_ref()).await;

        assert!(!engine.apply(completion));
        assert_eq!(engine.state().name(), "load-entry");
    }

    #[tokio::test]
    async fn test_asset_upload_generates_path() {
        let fixture = Fixture::new();
        fixture
            .remote
            .put_file(&fixture.repo, "/public/img/blips/20240309_01.png", b"old")
            .unwrap();
        let mut engine = fixture.engine();
        engine.settle().await;

        let op = engine.begin_asset_upload_on(png(8, 4), date()).unwrap();
        let completion = op.run(fixture.remote.as_ref()).await;
        assert!(engine.apply(completion));
        let SyncState::SaveAsset { asset, .. } = engine.state() else {
            panic!("expected save-asset, got {}", engine.state().name());
        };
        assert_eq!(asset.path, "/public/img/blips/20240309_02.png");

        engine.settle().await;
        assert_eq!(engine.state().name(), "repository-loaded");
        assert!(
            fixture
                .remote
                .file(&fixture.repo, "/public/img/blips/20240309_02.png")
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_encode_failure_has_no_asset() {
        let fixture = Fixture::new();
        let mut engine = fixture.engine();
        engine.settle().await;

        let input = AssetInput {
            bytes: b"garbage".to_vec(),
            media_type: "image/png".to_string(),
        };
        engine.upload_asset(input).await.unwrap();
        let SyncState::SaveAssetFailure { asset, error, .. } = engine.state() else {
            panic!("expected save-asset-failure");
        };
        assert!(asset.is_none());
        assert_eq!(error.category(), "encode-failure");
        assert_eq!(
            engine.save_asset().unwrap_err().category(),
            "invalid-intent"
        );
        engine.cancel().unwrap();
        assert_eq!(engine.settle().await.name(), "repository-loaded");
    }

    #[tokio::test]
    async fn test_select_directory() {
        let fixture = Fixture::new();
        fixture.remote.put_file(&fixture.repo, "/notes/a.mdx", b"a").unwrap();
        let mut engine = fixture.engine();
        engine.settle().await;

        assert_eq!(
            engine.select_posts_directory("/missing").unwrap_err(),
            SyncError::UnknownDirectory("/missing".to_string())
        );
        engine.select_posts_directory("notes/").unwrap();
        assert_eq!(engine.state().directories().posts, "/notes");
        assert_eq!(
            fixture.preferences.get(POSTS_DIRECTORY_KEY).as_deref(),
            Some("/notes")
        );
    }

    #[tokio::test]
    async fn test_reload_requires_settled_state() {
        let fixture = Fixture::new();
        let mut engine = fixture.engine();
        assert!(engine.reload().is_err());
        engine.settle().await;
        engine.reload().unwrap();
        assert_eq!(engine.state().name(), "loading-repository");
    }

    #[tokio::test]
    async fn test_edits_allowed_after_failed_save() {
        let fixture = Fixture::new();
        let mut engine = fixture.engine();
        engine.settle().await;
        engine.create_entry_on(date()).unwrap();

        fixture.remote.set_offline(true);
        engine.save_entry().unwrap();
        engine.settle().await;
        assert_eq!(engine.state().name(), "save-entry-failure");
        assert_eq!(engine.state().error().unwrap().category(), "transport-failure");

        engine
            .set_draft_content(DraftContent::Text("changed".to_string()))
            .unwrap();
        fixture.remote.set_offline(false);
        engine.save_entry().unwrap();
        engine.settle().await;
        assert_eq!(engine.state().name(), "repository-loaded");
        assert_eq!(
            fixture.remote.file(&fixture.repo, "/20240309_01.mdx").unwrap(),
            b"changed"
        );
    }

    #[tokio::test]
    async fn test_rename_loaded_entry() {
        let fixture = Fixture::new();
        fixture.remote.put_file(&fixture.repo, "/post.mdx", b"old").unwrap();
        fixture.remote.put_file(&fixture.repo, "/taken.mdx", b"taken").unwrap();
        let mut engine = fixture.engine();
        engine.settle().await;
        engine.open_entry("/post.mdx").unwrap();
        engine.settle().await;
        assert!(engine.state().draft().unwrap().sha.is_some());

        engine.set_draft_path("renamed.mdx").unwrap();
        assert_eq!(engine.state().draft().unwrap().sha, None);
        engine
            .set_draft_content(DraftContent::Text("moved".to_string()))
            .unwrap();
        engine.save_entry().unwrap();
        engine.settle().await;
        assert_eq!(engine.state().name(), "repository-loaded");
        assert_eq!(
            fixture.remote.file(&fixture.repo, "/renamed.mdx").unwrap(),
            b"moved"
        );
        assert_eq!(
            fixture.remote.file(&fixture.repo, "/post.mdx").unwrap(),
            b"old"
        );

        engine.open_entry("/renamed.mdx").unwrap();
        engine.settle().await;
        let taken = engine.state().tree().unwrap().get("/taken.mdx").unwrap().sha.clone();
        engine.set_draft_path("/taken.mdx").unwrap();
        assert_eq!(engine.state().draft().unwrap().sha, Some(taken));
    }
}
