//! Loading and saving the document: storage backends, the debounced
//! autosave and the startup hydration.

pub mod backend;
pub mod bridge;
pub mod debounce;

pub use backend::{HostFileBackend, LocalStorageBackend, MemoryBackend, StorageBackend};
pub use bridge::{hydrate, AutoSaver, Persistence};
pub use debounce::Debouncer;
