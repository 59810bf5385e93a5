//! Export, import and backup of the whole document, plus single-note
//! Markdown export.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tokio::fs;
use tracing::info;

use crate::models::{AppData, Note};
use crate::store::SharedStore;

/// Failures shown to the user. `Display` is the notification text.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Could not read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Could not write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("Invalid data file: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Could not serialize data: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Note not found: {0}")]
    NoteNotFound(String),
}

async fn write_file(path: &Path, content: &str) -> Result<(), TransferError> {
    fs::write(path, content).await.map_err(|source| TransferError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn snapshot_json(store: &SharedStore) -> Result<String, TransferError> {
    let data = store.lock().expect("store mutex").export_data();
    data.to_json_pretty().map_err(TransferError::Serialize)
}

// ---- Whole document ----

pub async fn export_to_file(store: &SharedStore, path: &Path) -> Result<(), TransferError> {
    let content = snapshot_json(store)?;
    write_file(path, &content).await?;
    info!(path = %path.display(), "Data exported");
    Ok(())
}

/// Replace the store's data with the document at `path`. The store is left
/// untouched if the file cannot be read or parsed.
pub async fn import_from_file(store: &SharedStore, path: &Path) -> Result<(), TransferError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| TransferError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let data = AppData::from_json(&content).map_err(TransferError::Parse)?;
    let notes = data.notes.len();

    store.lock().expect("store mutex").load_data(data);
    info!(path = %path.display(), notes, "Data imported");
    Ok(())
}

pub fn backup_file_name() -> String {
    format!("markpad-backup-{}.json", Local::now().format("%Y%m%d-%H%M%S"))
}

/// Write a timestamped copy of the document into `dir`.
pub async fn backup(store: &SharedStore, dir: &Path) -> Result<PathBuf, TransferError> {
    let content = snapshot_json(store)?;
    fs::create_dir_all(dir).await.map_err(|source| TransferError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(backup_file_name());
    write_file(&path, &content).await?;
    info!(path = %path.display(), "Backup written");
    Ok(path)
}

// ---- Markdown ----

pub fn note_to_markdown(note: &Note) -> String {
    format!("# {}\n\n{}", note.title, note.content)
}

/// Make a note title safe to use as a file name.
pub fn sanitize_filename(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .filter(|c| *c != '\u{00A0}' && *c != '\u{FEFF}')
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            _ => c,
        })
        .collect();

    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Write `<title>.md` for the note into `dir`.
pub async fn export_note_markdown(note: &Note, dir: &Path) -> Result<PathBuf, TransferError> {
    let path = dir.join(format!("{}.md", sanitize_filename(&note.title)));
    write_file(&path, &note_to_markdown(note)).await?;
    info!(note_id = %note.id, path = %path.display(), "Note exported as Markdown");
    Ok(path)
}
