//! Human-readable output for the blipper CLI.

use anyhow::Result;
use blipper_core::{
    Directories, DraftContent, FilePage, RepositoryRef, RepositorySummary, RevisionTree, SyncState,
};
use std::io::Write;

/// Format a repository summary as one line.
pub fn format_repository(repo: &RepositorySummary) -> String {
    format!("{:<40} {}", repo.full_name, repo.html_url)
}

pub fn print_repositories(repos: &[RepositorySummary], writer: &mut dyn Write) -> Result<()> {
    if repos.is_empty() {
        writeln!(writer, "No repositories found.")?;
        return Ok(());
    }
    writeln!(writer, "Repositories ({}):", repos.len())?;
    for repo in repos {
        writeln!(writer, "  {}", format_repository(repo))?;
    }
    Ok(())
}

/// Print the engine state: repository, revision, directories and any error.
pub fn print_status(repo: &RepositoryRef, state: &SyncState, writer: &mut dyn Write) -> Result<()> {
    writeln!(writer, "Repository: {}", repo)?;
    writeln!(writer, "State:      {}", state.name())?;
    if let Some(tree) = state.tree() {
        writeln!(writer, "Revision:   {}", tree.sha)?;
        writeln!(
            writer,
            "Files:      {} in {} directories",
            tree.blobs().count(),
            tree.directories().len()
        )?;
        if tree.truncated {
            writeln!(writer, "Warning:    listing truncated by the remote")?;
        }
    }
    let directories = state.directories();
    writeln!(writer, "Posts:      {}", directories.posts)?;
    writeln!(writer, "Images:     {}", directories.images)?;
    if let Some(error) = state.error() {
        writeln!(writer, "Error:      [{}] {}", error.category(), error)?;
    }
    Ok(())
}

/// List every directory of `tree`, marking the selected ones.
pub fn print_directories(
    tree: &RevisionTree,
    directories: &Directories,
    writer: &mut dyn Write,
) -> Result<()> {
    let mut all = vec!["/"];
    all.extend(tree.directories());
    for dir in all {
        let mut marks = Vec::new();
        if dir == directories.posts {
            marks.push("posts");
        }
        if dir == directories.images {
            marks.push("images");
        }
        if marks.is_empty() {
            writeln!(writer, "  {}", dir)?;
        } else {
            writeln!(writer, "* {} ({})", dir, marks.join(", "))?;
        }
    }
    Ok(())
}

pub fn print_file_page(dir: &str, page: &FilePage<'_>, writer: &mut dyn Write) -> Result<()> {
    writeln!(writer, "{} (page {}):", dir, page.page + 1)?;
    if page.items.is_empty() {
        writeln!(writer, "  (no files)")?;
    }
    for path in &page.items {
        writeln!(writer, "  {}", path)?;
    }
    let mut nav = Vec::new();
    if page.has_previous {
        nav.push(format!("--page {} for previous", page.page));
    }
    if page.has_next {
        nav.push(format!("--page {} for next", page.page + 2));
    }
    if !nav.is_empty() {
        writeln!(writer, "  [{}]", nav.join("; "))?;
    }
    Ok(())
}

/// Print a file body; binary content is summarized.
pub fn print_content(content: &DraftContent, writer: &mut dyn Write) -> Result<()> {
    match content {
        DraftContent::Text(text) => write!(writer, "{}", text)?,
        DraftContent::Binary(bytes) => {
            writeln!(writer, "<binary content, {}>", format_size(bytes.len() as u64))?
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
