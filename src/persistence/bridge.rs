use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backend::{HostFileBackend, LocalStorageBackend, MemoryBackend, StorageBackend};
use super::debounce::Debouncer;
use crate::config::{AppConfig, BackendKind};
use crate::models::AppData;
use crate::store::SharedStore;

// ---- Sink selection ----

/// The host bridge (when available) plus the local key/value fallback.
pub struct Persistence {
    host: Option<Arc<dyn StorageBackend>>,
    local: Arc<dyn StorageBackend>,
    // One write at a time; the snapshot is taken while holding it.
    write_lock: AsyncMutex<()>,
    /// Latest store revision known to be on disk.
    saved_revision: AtomicU64,
}

impl Persistence {
    pub fn new(host: Option<Arc<dyn StorageBackend>>, local: Arc<dyn StorageBackend>) -> Self {
        Self {
            host,
            local,
            write_lock: AsyncMutex::new(()),
            saved_revision: AtomicU64::new(0),
        }
    }

    /// Use exactly one backend for both loading and saving.
    pub fn single(backend: Arc<dyn StorageBackend>) -> Self {
        Self::new(None, backend)
    }

    /// Pick backends from configuration, probing the host directory when
    /// the kind is `auto`.
    pub async fn open(config: &AppConfig) -> Self {
        let local: Arc<dyn StorageBackend> = Arc::new(LocalStorageBackend::new(&config.data_dir));
        let persistence = match config.backend {
            BackendKind::Memory => Self::single(Arc::new(MemoryBackend::new())),
            BackendKind::Local => Self::single(local),
            BackendKind::Host => Self::new(Some(Arc::new(HostFileBackend::new(&config.data_dir))), local),
            BackendKind::Auto => {
                let host = HostFileBackend::probe(&config.data_dir)
                    .await
                    .map(|b| Arc::new(b) as Arc<dyn StorageBackend>);
                Self::new(host, local)
            }
        };
        info!(sink = persistence.sink_name(), dir = %config.data_dir.display(), "persistence ready");
        persistence
    }

    /// Backend that saves go to.
    pub fn sink(&self) -> &Arc<dyn StorageBackend> {
        self.host.as_ref().unwrap_or(&self.local)
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink().name()
    }

    /// Read the stored document. Tries the host first and falls back to
    /// local storage if the host fails. Errors are logged, never returned.
    pub async fn load(&self) -> Option<String> {
        if let Some(host) = &self.host {
            match host.load().await {
                Ok(content) => return content,
                Err(e) => warn!(backend = host.name(), error = %format!("{:#}", e), "Failed to load data, trying local storage"),
            }
        }
        match self.local.load().await {
            Ok(content) => content,
            Err(e) => {
                error!(backend = self.local.name(), error = %format!("{:#}", e), "Failed to load data");
                None
            }
        }
    }

    /// Write a document to the sink.
    pub async fn save(&self, data: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.sink().save(data).await
    }

    pub fn saved_revision(&self) -> u64 {
        self.saved_revision.load(Ordering::SeqCst)
    }

    /// Record that `revision` needs no save, e.g. because it was just loaded.
    pub fn mark_saved(&self, revision: u64) {
        self.saved_revision.fetch_max(revision, Ordering::SeqCst);
    }

    /// Serialize the store as it is now and write it. Failures are logged.
    pub async fn save_store(&self, store: &SharedStore) -> bool {
        let _guard = self.write_lock.lock().await;
        self.write_snapshot(store).await
    }

    /// Save only if the store changed since the last successful save. Waits
    /// for a save already in flight before comparing.
    pub async fn save_if_changed(&self, store: &SharedStore) -> bool {
        let _guard = self.write_lock.lock().await;
        let revision = store.lock().expect("store mutex").revision();
        if revision <= self.saved_revision() {
            return false;
        }
        self.write_snapshot(store).await
    }

    // Caller holds `write_lock`.
    async fn write_snapshot(&self, store: &SharedStore) -> bool {
        let (revision, snapshot) = {
            let store = store.lock().expect("store mutex");
            (store.revision(), store.export_data())
        };

        let content = match snapshot.to_json_pretty() {
            Ok(content) => content,
            Err(e) => {
                error!(error = %e, "Failed to serialize data");
                return false;
            }
        };
        match self.sink().save(&content).await {
            Ok(()) => {
                self.mark_saved(revision);
                debug!(backend = self.sink_name(), revision, bytes = content.len(), "Data saved");
                true
            }
            Err(e) => {
                error!(backend = self.sink_name(), error = %format!("{:#}", e), "Failed to save data");
                false
            }
        }
    }
}

// ---- Startup ----

/// Load the persisted document into the store. On any failure the store
/// keeps whatever it already holds. Returns whether data was loaded.
pub async fn hydrate(store: &SharedStore, persistence: &Persistence) -> bool {
    let Some(content) = persistence.load().await else {
        info!("No saved data, starting with defaults");
        return false;
    };

    match AppData::from_json(&content) {
        Ok(data) => {
            let notes = data.notes.len();
            store.lock().expect("store mutex").load_data(data);
            info!(notes, "Data loaded");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to parse saved data");
            false
        }
    }
}

// ---- Autosave ----

/// Saves the store a quiet period after it last changed.
pub struct AutoSaver {
    store: SharedStore,
    persistence: Arc<Persistence>,
    debouncer: Arc<Debouncer>,
    watcher: JoinHandle<()>,
}

impl AutoSaver {
    /// Start watching the store. The notification present at subscription
    /// time reflects already-persisted state and does not trigger a save.
    pub fn spawn(store: SharedStore, persistence: Arc<Persistence>, delay: Duration) -> Self {
        let debouncer = Arc::new(Debouncer::new(delay));

        let mut changes = store.lock().expect("store mutex").subscribe();
        let mounted_at = *changes.borrow_and_update();
        changes.mark_changed();
        persistence.mark_saved(mounted_at);

        let watcher = {
            let store = Arc::clone(&store);
            let persistence = Arc::clone(&persistence);
            let debouncer = Arc::clone(&debouncer);
            tokio::spawn(async move {
                while changes.changed().await.is_ok() {
                    let revision = *changes.borrow_and_update();
                    if revision == mounted_at {
                        continue;
                    }
                    debug!(revision, "store changed, save scheduled");

                    let store = Arc::clone(&store);
                    let persistence = Arc::clone(&persistence);
                    debouncer.schedule(async move {
                        persistence.save_store(&store).await;
                    });
                }
            })
        };

        Self {
            store,
            persistence,
            debouncer,
            watcher,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Drop the pending timer and write any unsaved change now. A save
    /// that already started is awaited first. Returns whether this call
    /// wrote anything.
    pub async fn flush(&self) -> bool {
        self.debouncer.cancel();
        self.persistence.save_if_changed(&self.store).await
    }

    /// Stop watching and write any unsaved change.
    pub async fn shutdown(self) {
        self.watcher.abort();
        self.flush().await;
    }
}
