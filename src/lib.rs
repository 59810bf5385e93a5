pub mod config;
pub mod id;
pub mod images;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod store;
pub mod transfer;
pub mod view;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use tracing::info;

pub use config::{AppConfig, BackendKind};
pub use images::ImageStore;
pub use models::AppData;
pub use persistence::{hydrate, AutoSaver, Persistence};
pub use store::{SharedStore, Store};
pub use transfer::TransferError;

const USAGE: &str =
    "usage: markpad [summary | export <file> | import <file> | backup [dir] | export-md <note-id> [dir] | images | add-image <file>]";

/// A single invocation of the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Summary,
    Export(PathBuf),
    Import(PathBuf),
    Backup(Option<PathBuf>),
    ExportMarkdown { note_id: String, dir: Option<PathBuf> },
    Images,
    AddImage(PathBuf),
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let arg = |i: usize| args.get(i).map(String::as_str);
        let command = match (arg(0), arg(1), arg(2)) {
            (None, None, None) | (Some("summary"), None, None) => Command::Summary,
            (Some("export"), Some(file), None) => Command::Export(PathBuf::from(file)),
            (Some("import"), Some(file), None) => Command::Import(PathBuf::from(file)),
            (Some("images"), None, None) => Command::Images,
            (Some("add-image"), Some(file), None) => Command::AddImage(PathBuf::from(file)),
            (Some("backup"), dir, None) => Command::Backup(dir.map(PathBuf::from)),
            (Some("export-md"), Some(id), dir) if args.len() <= 3 => Command::ExportMarkdown {
                note_id: id.to_string(),
                dir: dir.map(PathBuf::from),
            },
            _ => bail!(USAGE),
        };
        Ok(command)
    }
}

fn print_summary(store: &Store) {
    let settings = store.settings();
    println!(
        "{} notes, {} folders, {} projects, {} types, {} tags (theme: {:?})",
        store.notes().len(),
        store.folders().len(),
        store.projects().len(),
        store.types().len(),
        store.tags().len(),
        settings.theme,
    );

    let grouped = store.grouped_notes();
    for group in &grouped.folders {
        println!("{}/", group.folder.name);
        for note in &group.notes {
            println!("  {}{}  [{}]", if note.is_pinned { "* " } else { "" }, note.title, note.id);
        }
    }
    for note in &grouped.loose {
        println!("{}{}  [{}]", if note.is_pinned { "* " } else { "" }, note.title, note.id);
    }
}

async fn execute(command: Command, store: &SharedStore, config: &AppConfig) -> Result<()> {
    match command {
        Command::Summary => print_summary(&store.lock().expect("store mutex")),
        Command::Export(path) => {
            transfer::export_to_file(store, &path).await?;
            println!("Exported to {}", path.display());
        }
        Command::Import(path) => {
            transfer::import_from_file(store, &path).await?;
            println!("Imported {}", path.display());
        }
        Command::Backup(dir) => {
            let dir = dir.unwrap_or_else(|| config.data_dir.join("backups"));
            let path = transfer::backup(store, &dir).await?;
            println!("Backup written to {}", path.display());
        }
        Command::ExportMarkdown { note_id, dir } => {
            let note = store
                .lock()
                .expect("store mutex")
                .note(&note_id)
                .cloned()
                .ok_or_else(|| TransferError::NoteNotFound(note_id.clone()))?;
            let dir = dir.unwrap_or_else(|| PathBuf::from("."));
            let path = transfer::export_note_markdown(&note, &dir).await?;
            println!("Wrote {}", path.display());
        }
        Command::Images => {
            let images = ImageStore::new(&config.data_dir).list().await?;
            for image in &images {
                println!("{}  {} bytes", image.filename, image.size);
            }
            println!("{} images", images.len());
        }
        Command::AddImage(file) => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Could not read {}", file.display()))?;
            let extension = file.extension().and_then(|e| e.to_str()).unwrap_or("");
            let path = ImageStore::new(&config.data_dir)
                .save(&general_purpose::STANDARD.encode(bytes), extension)
                .await?;
            println!("Image stored at {}", path.display());
        }
    }
    Ok(())
}

/// Start the app, run one command and persist any change. Returns the
/// process exit code.
pub async fn run(args: Vec<String>) -> Result<i32> {
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(2);
        }
    };

    let config = AppConfig::load();
    logging::init(&config.log_filter);
    info!(?command, backend = ?config.backend, "markpad starting");

    let persistence = Arc::new(Persistence::open(&config).await);
    let store = Store::new().into_shared();
    hydrate(&store, &persistence).await;

    let saver = AutoSaver::spawn(Arc::clone(&store), Arc::clone(&persistence), config.save_debounce());
    let outcome = execute(command, &store, &config).await;
    saver.shutdown().await;

    match outcome {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("{:#}", e);
            Ok(1)
        }
    }
}
