use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

/// File name of the document written by the native host.
pub const DATA_FILE_NAME: &str = "markpad-data.json";
/// File backing the local key/value store.
pub const LOCAL_STORAGE_FILE_NAME: &str = "local-storage.json";
/// Key the document is stored under in the local key/value store.
pub const STORAGE_KEY: &str = "markpad-data";

/// A single-slot destination for the serialized document. Every save fully
/// replaces the previous blob.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// The stored document, or `None` if nothing has been saved yet.
    async fn load(&self) -> Result<Option<String>>;

    async fn save(&self, data: &str) -> Result<()>;
}

// Write to a sibling temp file and rename over the target.
async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

// ---- Host bridge ----

/// The native host's file-backed store: one JSON file in the app data
/// directory.
pub struct HostFileBackend {
    path: PathBuf,
}

impl HostFileBackend {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(DATA_FILE_NAME),
        }
    }

    /// Returns the backend only if its data directory can be created.
    pub async fn probe(data_dir: impl AsRef<Path>) -> Option<Self> {
        let dir = data_dir.as_ref();
        match fs::create_dir_all(dir).await {
            Ok(()) => Some(Self::new(dir)),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "host storage unavailable");
                None
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StorageBackend for HostFileBackend {
    fn name(&self) -> &'static str {
        "host"
    }

    async fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    async fn save(&self, data: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        write_atomic(&self.path, data).await
    }
}

// ---- Local key/value store ----

/// Persistent string key/value store kept as one JSON object on disk, the
/// stand-in for browser local storage.
pub struct LocalStorageBackend {
    path: PathBuf,
    key: String,
}

impl LocalStorageBackend {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(LOCAL_STORAGE_FILE_NAME),
            key: STORAGE_KEY.to_string(),
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    /// Raw file contents; `None` if the file does not exist yet.
    async fn read_file(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    fn parse_entries(&self, content: &str) -> Result<BTreeMap<String, String>> {
        serde_json::from_str(content)
            .with_context(|| format!("Corrupt local storage at {}", self.path.display()))
    }
}

#[async_trait]
impl StorageBackend for LocalStorageBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn load(&self) -> Result<Option<String>> {
        let Some(content) = self.read_file().await? else {
            return Ok(None);
        };
        let mut entries = self.parse_entries(&content)?;
        Ok(entries.remove(&self.key))
    }

    async fn save(&self, data: &str) -> Result<()> {
        // Other keys survive. Only an unparseable file is replaced; a failed
        // read aborts the save.
        let mut entries = match self.read_file().await? {
            Some(content) => self.parse_entries(&content).unwrap_or_else(|e| {
                tracing::warn!(error = %format!("{:#}", e), "Replacing corrupt local storage");
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };
        entries.insert(self.key.clone(), data.to_string());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string(&entries)?;
        write_atomic(&self.path, &content).await
    }
}

// ---- In-memory ----

/// Keeps the document in process memory.
#[derive(Default)]
pub struct MemoryBackend {
    slot: Mutex<Option<String>>,
    saves: Mutex<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: &str) -> Self {
        Self {
            slot: Mutex::new(Some(content.to_string())),
            saves: Mutex::new(0),
        }
    }

    pub fn content(&self) -> Option<String> {
        self.slot.lock().expect("memory backend mutex").clone()
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().expect("memory backend mutex")
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self) -> Result<Option<String>> {
        Ok(self.content())
    }

    async fn save(&self, data: &str) -> Result<()> {
        *self.slot.lock().expect("memory backend mutex") = Some(data.to_string());
        *self.saves.lock().expect("memory backend mutex") += 1;
        Ok(())
    }
}
