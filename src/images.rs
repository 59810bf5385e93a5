//! Pasted images, stored as files under `<data dir>/images`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

pub const IMAGES_DIR_NAME: &str = "images";
const DEFAULT_EXTENSION: &str = "png";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub filename: String,
    pub path: PathBuf,
    /// Bytes on disk
    pub size: u64,
    /// Unix millis taken from the file name, 0 if it has none
    pub created_at: i64,
}

/// Decode a base64 payload, with or without a `data:<mime>;base64,` prefix.
pub fn decode_payload(image_data: &str) -> Result<Vec<u8>> {
    let encoded = match image_data.split_once("base64,") {
        Some((_, rest)) => rest,
        None => image_data,
    };
    general_purpose::STANDARD
        .decode(encoded.trim())
        .context("Invalid base64 image data")
}

fn timestamp_of(filename: &str) -> i64 {
    filename
        .split('.')
        .next()
        .and_then(|stem| stem.parse().ok())
        .unwrap_or(0)
}

pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join(IMAGES_DIR_NAME),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the image as `<unix-millis>.<extension>` and return its path.
    pub async fn save(&self, image_data: &str, extension: &str) -> Result<PathBuf> {
        let bytes = decode_payload(image_data)?;
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let extension = match extension.trim().trim_start_matches('.') {
            "" => DEFAULT_EXTENSION,
            ext => ext,
        };
        // Two images in the same millisecond get consecutive names.
        let mut millis = Utc::now().timestamp_millis();
        let mut path = self.dir.join(format!("{}.{}", millis, extension));
        while fs::try_exists(&path).await.unwrap_or(false) {
            millis += 1;
            path = self.dir.join(format!("{}.{}", millis, extension));
        }

        fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), bytes = bytes.len(), "Image saved");
        Ok(path)
    }

    /// Every stored image, newest first.
    pub async fn list(&self) -> Result<Vec<ImageInfo>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", self.dir.display())),
        };

        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            let filename = entry.file_name().to_string_lossy().to_string();
            images.push(ImageInfo {
                created_at: timestamp_of(&filename),
                filename,
                path: entry.path(),
                size: metadata.len(),
            });
        }

        images.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        debug!(count = images.len(), "images listed");
        Ok(images)
    }

    /// Remove an image. Only files inside the image directory are accepted.
    pub async fn delete(&self, path: &Path) -> Result<()> {
        let in_store = path.parent() == Some(self.dir.as_path())
            || path.parent() == Some(Path::new(""));
        if !in_store {
            bail!("{} is not in the image store", path.display());
        }
        let path = self.dir.join(path.file_name().context("Image path has no file name")?);

        fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to delete {}", path.display()))?;
        info!(path = %path.display(), "Image deleted");
        Ok(())
    }
}
