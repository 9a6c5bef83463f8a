//! blipper: publish dated blips and images to a GitHub repository.
//!
//! # Usage
//!
//! ```bash
//! # Store an access token obtained from GitHub
//! blipper login --token ghp_xxx
//!
//! # Pick a repository and show what was loaded
//! blipper status --repo octo/blog
//!
//! # Choose where posts and images live
//! blipper dirs --posts /src/collections/blips --images /public/img/blips
//!
//! # Create today's next entry from a file
//! blipper new --content-file draft.mdx
//!
//! # Replace an existing entry
//! blipper edit /src/collections/blips/20240309_01.mdx --content-file draft.mdx
//!
//! # Resize and upload an image
//! blipper upload photo.jpg
//! ```

mod render;
mod workspace;

use anyhow::{Context, Result, anyhow};
use blipper_core::asset::media_type_for_path;
use blipper_core::{
    AssetInput, ContentSyncEngine, DraftContent, SourceControl, SyncState, TokenStore,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use workspace::Workspace;

#[derive(Parser, Debug)]
#[command(name = "blipper")]
#[command(author = "Blipper Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Publish dated blips and images to a GitHub repository")]
struct Cli {
    /// Config directory (default: <platform config dir>/blipper)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Repository as owner/name (default: the last one used)
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store an access token
    Login {
        #[arg(long)]
        token: String,
    },

    /// Remove the stored access token
    Logout,

    /// Show the authenticated user
    Whoami,

    /// List repositories owned by the authenticated user
    Repos,

    /// Load the repository and show its state
    Status,

    /// List directories and select the posts/images directories
    Dirs {
        /// New posts directory
        #[arg(long)]
        posts: Option<String>,
        /// New images directory
        #[arg(long)]
        images: Option<String>,
    },

    /// List files in a directory (default: the posts directory)
    Ls {
        dir: Option<String>,
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Reverse name order
        #[arg(long)]
        newest_first: bool,
    },

    /// Print a file
    Show {
        path: String,
    },

    /// Create the next entry for a day
    New {
        /// Entry content (default: front matter only)
        #[arg(long)]
        content_file: Option<PathBuf>,
        /// Entry date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Replace the content of an existing file
    Edit {
        path: String,
        #[arg(long)]
        content_file: PathBuf,
        /// Save under a different path
        #[arg(long)]
        rename: Option<String>,
    },

    /// Resize and upload an image to the images directory
    Upload {
        image: PathBuf,
        /// Upload date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let directive = if cli.debug { "blipper=debug" } else { "blipper=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => workspace::default_config_dir()?,
    };
    let workspace = Workspace::open(config_dir)?;
    tracing::debug!("Config directory: {}", workspace.dir().display());
    let repo = cli.repo.as_deref();

    match cli.command {
        Commands::Login { token } => cmd_login(&workspace, &token),
        Commands::Logout => cmd_logout(&workspace),
        Commands::Whoami => cmd_whoami(&workspace).await,
        Commands::Repos => cmd_repos(&workspace).await,
        Commands::Status => cmd_status(&workspace, repo).await,
        Commands::Dirs { posts, images } => {
            cmd_dirs(&workspace, repo, posts.as_deref(), images.as_deref()).await
        }
        Commands::Ls {
            dir,
            page,
            limit,
            newest_first,
        } => cmd_ls(&workspace, repo, dir.as_deref(), page, limit, newest_first).await,
        Commands::Show { path } => cmd_show(&workspace, repo, &path).await,
        Commands::New { content_file, date } => {
            cmd_new(&workspace, repo, content_file.as_deref(), date).await
        }
        Commands::Edit {
            path,
            content_file,
            rename,
        } => cmd_edit(&workspace, repo, &path, &content_file, rename.as_deref()).await,
        Commands::Upload { image, date } => cmd_upload(&workspace, repo, &image, date).await,
    }
}

/// Turn a failure state into an error.
fn check(engine: &ContentSyncEngine) -> Result<()> {
    match engine.state().error() {
        Some(error) => Err(anyhow::Error::new(error.clone())
            .context(format!("{} ({})", engine.state().name(), error.category()))),
        None => Ok(()),
    }
}

/// Create an engine and load the repository.
async fn load(
    workspace: &Workspace,
    repo: Option<&str>,
) -> Result<(ContentSyncEngine, Arc<dyn SourceControl>)> {
    let remote = workspace.client()?;
    let repo = workspace.resolve_repository(repo)?;
    let mut engine = workspace.engine(remote.clone(), repo);
    engine.settle().await;
    check(&engine)?;
    Ok((engine, remote))
}

/// Save the current draft and reload.
async fn save(engine: &mut ContentSyncEngine) -> Result<()> {
    engine.save_entry()?;
    engine.step().await;
    check(engine)?;
    engine.settle().await;
    check(engine)
}

fn read_content(path: &Path) -> Result<DraftContent> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(DraftContent::from_bytes(bytes))
}

fn cmd_login(workspace: &Workspace, token: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        return Err(anyhow!("Token must not be empty"));
    }
    workspace.file_tokens().set_token(token)?;
    println!("Token saved in {}", workspace.dir().display());
    Ok(())
}

fn cmd_logout(workspace: &Workspace) -> Result<()> {
    workspace.file_tokens().clear()?;
    println!("Token removed.");
    Ok(())
}

async fn cmd_whoami(workspace: &Workspace) -> Result<()> {
    let user = workspace.client()?.current_user().await?;
    println!("Logged in as {} (id {})", user.login, user.id);
    Ok(())
}

async fn cmd_repos(workspace: &Workspace) -> Result<()> {
    let repos = workspace.client()?.list_repositories().await?;
    render::print_repositories(&repos, &mut std::io::stdout())
}

async fn cmd_status(workspace: &Workspace, repo: Option<&str>) -> Result<()> {
    let remote = workspace.client()?;
    let repo = workspace.resolve_repository(repo)?;
    let mut engine = workspace.engine(remote, repo);
    engine.settle().await;
    render::print_status(engine.repository(), engine.state(), &mut std::io::stdout())?;
    check(&engine)
}

async fn cmd_dirs(
    workspace: &Workspace,
    repo: Option<&str>,
    posts: Option<&str>,
    images: Option<&str>,
) -> Result<()> {
    let (mut engine, _) = load(workspace, repo).await?;
    if let Some(dir) = posts {
        engine.select_posts_directory(dir)?;
    }
    if let Some(dir) = images {
        engine.select_images_directory(dir)?;
    }

    let state = engine.state();
    let tree = state
        .tree()
        .ok_or_else(|| anyhow!("Repository tree is not loaded"))?;
    render::print_directories(tree, state.directories(), &mut std::io::stdout())
}

async fn cmd_ls(
    workspace: &Workspace,
    repo: Option<&str>,
    dir: Option<&str>,
    page: usize,
    limit: usize,
    newest_first: bool,
) -> Result<()> {
    if page == 0 || limit == 0 {
        return Err(anyhow!("--page and --limit start at 1"));
    }
    let (engine, _) = load(workspace, repo).await?;
    let state = engine.state();
    let tree = state
        .tree()
        .ok_or_else(|| anyhow!("Repository tree is not loaded"))?;
    let dir = dir
        .map(blipper_core::paths::normalize)
        .unwrap_or_else(|| state.directories().posts.clone());
    let listing = tree.file_page(&dir, page - 1, limit, newest_first);
    render::print_file_page(&dir, &listing, &mut std::io::stdout())
}

async fn cmd_show(workspace: &Workspace, repo: Option<&str>, path: &str) -> Result<()> {
    let (mut engine, _) = load(workspace, repo).await?;
    engine.open_entry(path)?;
    engine.settle().await;
    check(&engine)?;

    let draft = engine
        .state()
        .draft()
        .ok_or_else(|| anyhow!("No draft after loading {}", path))?;
    render::print_content(&draft.content, &mut std::io::stdout())
}

async fn cmd_new(
    workspace: &Workspace,
    repo: Option<&str>,
    content_file: Option<&Path>,
    date: Option<NaiveDate>,
) -> Result<()> {
    let (mut engine, _) = load(workspace, repo).await?;
    match date {
        Some(date) => engine.create_entry_on(date)?,
        None => engine.create_entry()?,
    }
    if let Some(file) = content_file {
        engine.set_draft_content(read_content(file)?)?;
    }

    let path = engine
        .state()
        .draft()
        .map(|d| d.path.clone())
        .unwrap_or_default();
    save(&mut engine).await?;
    println!("Created {}", path);
    Ok(())
}

async fn cmd_edit(
    workspace: &Workspace,
    repo: Option<&str>,
    path: &str,
    content_file: &Path,
    rename: Option<&str>,
) -> Result<()> {
    let content = read_content(content_file)?;
    let (mut engine, _) = load(workspace, repo).await?;
    engine.open_entry(path)?;
    engine.settle().await;
    check(&engine)?;

    engine.set_draft_content(content)?;
    if let Some(new_path) = rename {
        engine.set_draft_path(new_path)?;
    }
    let saved = engine
        .state()
        .draft()
        .map(|d| d.path.clone())
        .unwrap_or_default();
    save(&mut engine).await?;
    println!("Saved {}", saved);
    Ok(())
}

async fn cmd_upload(
    workspace: &Workspace,
    repo: Option<&str>,
    image: &Path,
    date: Option<NaiveDate>,
) -> Result<()> {
    let bytes = std::fs::read(image).with_context(|| format!("Failed to read {}", image.display()))?;
    let input = AssetInput {
        bytes,
        media_type: media_type_for_path(image).to_string(),
    };

    let (mut engine, remote) = load(workspace, repo).await?;
    let op = match date {
        Some(date) => engine.begin_asset_upload_on(input, date)?,
        None => engine.begin_asset_upload(input)?,
    };
    let completion = op.run(remote.as_ref()).await;
    engine.apply(completion);
    check(&engine)?;

    let uploaded = match engine.state() {
        SyncState::SaveAsset { asset, .. } => asset.path.clone(),
        other => return Err(anyhow!("Unexpected state after encoding: {}", other.name())),
    };
    engine.settle().await;
    check(&engine)?;
    println!("Uploaded {}", uploaded);
    Ok(())
}
