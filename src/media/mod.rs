//! Shared media index — where the OS drops freshly captured screenshots.
//!
//! The pipeline never writes here itself (the capture channels do, via the
//! OS); it only queries for recent rows and subscribes to change events.
//! The trait seam exists so hosts with a real media database can plug in;
//! the crate ships a directory-backed implementation.

mod fs_index;
pub mod watcher;

pub use fs_index::FsMediaIndex;
pub use watcher::{ArtifactRecord, ArtifactWatcher, WatcherConfig};

use std::path::PathBuf;

use tokio::sync::mpsc;

/// One row of the media index, ordered by recency when queried.
#[derive(Debug, Clone)]
pub struct MediaRow {
    /// Stable identity within the index (the path string for the fs impl).
    pub identity: String,
    pub path: PathBuf,
    pub display_name: String,
    /// Creation (or modification) time, epoch milliseconds.
    pub created_ms: u64,
    pub size_bytes: u64,
    /// Containing bucket/folder name, used by the screenshot heuristic.
    pub bucket: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media root is not readable: {0}")]
    NotReadable(String),

    #[error("change subscription failed: {0}")]
    Subscribe(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Live change subscription. Dropping it tears down the underlying watch.
pub struct MediaSubscription {
    events: mpsc::Receiver<()>,
    // Keeps the OS watcher alive for the subscription's lifetime.
    _guard: Option<Box<dyn std::any::Any + Send>>,
}

impl MediaSubscription {
    pub fn new(events: mpsc::Receiver<()>) -> Self {
        Self {
            events,
            _guard: None,
        }
    }

    pub fn with_guard(events: mpsc::Receiver<()>, guard: Box<dyn std::any::Any + Send>) -> Self {
        Self {
            events,
            _guard: Some(guard),
        }
    }

    /// Await the next change notification. `None` when the source is gone.
    pub async fn changed(&mut self) -> Option<()> {
        self.events.recv().await
    }
}

/// Query + subscription contract over the shared media index.
pub trait MediaIndex: Send + Sync {
    /// Does the process have read access to the index at all?
    fn is_readable(&self) -> bool;

    /// The most recent `limit` rows, newest first.
    fn query_recent(&self, limit: usize) -> Vec<MediaRow>;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> Result<MediaSubscription, MediaError>;
}
