//! Directory-backed media index.
//!
//! Treats a screenshots root (default `~/Pictures/Screenshots`) plus its
//! immediate subdirectories as the index: every image file is a row, the
//! containing directory name is its bucket. Change notifications come
//! from the platform filesystem watcher.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::{MediaError, MediaIndex, MediaRow, MediaSubscription};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];
// Root plus one level of bucket directories; deep trees are not media indexes.
const MAX_SCAN_DEPTH: usize = 2;

pub struct FsMediaIndex {
    root: PathBuf,
}

impl FsMediaIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Platform default screenshots root.
    pub fn default_root() -> PathBuf {
        dirs::picture_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Screenshots")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collect_rows(&self, dir: &Path, depth: usize, rows: &mut Vec<MediaRow>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("[INDEX] Cannot read {}: {}", dir.display(), e);
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if depth + 1 < MAX_SCAN_DEPTH {
                    self.collect_rows(&path, depth + 1, rows);
                }
                continue;
            }
            if !has_image_extension(&path) {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let created_ms = meta
                .created()
                .or_else(|_| meta.modified())
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            let display_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let bucket = path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            rows.push(MediaRow {
                identity: path.to_string_lossy().into_owned(),
                path,
                display_name,
                created_ms,
                size_bytes: meta.len(),
                bucket,
            });
        }
    }
}

impl MediaIndex for FsMediaIndex {
    fn is_readable(&self) -> bool {
        std::fs::read_dir(&self.root).is_ok()
    }

    fn query_recent(&self, limit: usize) -> Vec<MediaRow> {
        let mut rows = Vec::new();
        self.collect_rows(&self.root, 0, &mut rows);
        rows.sort_by(|a, b| b.created_ms.cmp(&a.created_ms));
        rows.truncate(limit);
        rows
    }

    fn subscribe(&self) -> Result<MediaSubscription, MediaError> {
        // Bounded channel: one pending wakeup is enough, the watcher
        // re-queries the index on every event anyway.
        let (tx, rx) = mpsc::channel(8);
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            if event.is_ok() {
                let _ = tx.try_send(());
            }
        })
        .map_err(|e| MediaError::Subscribe(e.to_string()))?;
        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| MediaError::Subscribe(e.to_string()))?;
        log::debug!("[INDEX] Watching {} for changes", self.root.display());
        Ok(MediaSubscription::with_guard(rx, Box::new(watcher)))
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}
