//! Blipper Core Library
//!
//! Core functionality for Blipper including:
//! - Path normalization and dated, sequenced file names
//! - Repository snapshot and draft model
//! - Token and preference stores (in-memory and on-disk)
//! - HTTP transport with JSON shape validation
//! - Source-control client for GitHub and an in-memory remote
//! - Image normalization for uploads
//! - The browse/edit/publish sync engine

pub mod asset;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod paths;
pub mod preferences;
pub mod remote;
pub mod token;
pub mod transport;

pub use asset::{AssetInput, EncodeOptions, EncodedImage, OutputFormat, encode_image};
pub use config::{BlipperConfig, DEFAULT_API_BASE_URL};
pub use engine::{Completion, ContentSyncEngine, Directories, PendingOp, SyncState};
pub use error::{Result, SyncError};
pub use model::{
    AssetDraft, CurrentUser, DraftContent, EditableDraft, EntryKind, FileContent, FilePage,
    RepositoryRef, RepositorySummary, RevisionTree, TreeEntry, WriteFileRequest, WriteReceipt,
};
pub use preferences::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
pub use remote::{GitHubClient, MemoryRemote, SourceControl};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use transport::{ApiTransport, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
