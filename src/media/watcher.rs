//! Artifact watcher — detects the screenshot the OS just wrote.
//!
//! Detection is deliberately redundant: a change subscription on the media
//! index plus an independent poll loop, because push notifications have
//! unreliable timing on some hosts. Both paths converge on the same query,
//! and an atomic gate guarantees the found-artifact callback fires at most
//! once even if they resolve concurrently.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{MediaIndex, MediaRow};

/// Detection tuning. Defaults give ≈10s of polling and ≈2s of
/// per-candidate stabilization.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub stabilize_interval: Duration,
    pub max_stabilize_attempts: u32,
    /// Tolerance for clock skew between the capture command and the
    /// index write when rejecting stale rows.
    pub drift_window: Duration,
    pub max_recent_rows: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_polls: 20,
            stabilize_interval: Duration::from_millis(100),
            max_stabilize_attempts: 20,
            drift_window: Duration::from_secs(5),
            max_recent_rows: 5,
        }
    }
}

/// A stabilized, dispatched screenshot artifact. Immutable once built.
#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub identity: String,
    pub path: std::path::PathBuf,
    pub display_name: String,
    pub size_bytes: u64,
}

/// At-most-once dispatch guard shared by the event and poll paths.
pub(crate) struct DispatchGate(AtomicBool);

impl DispatchGate {
    pub(crate) fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// First caller wins; every later claim returns false.
    pub(crate) fn claim(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

/// Background watcher over the media index. One instance registered at a
/// time; dropping (or `unregister`) tears down both detection paths.
pub struct ArtifactWatcher {
    task: JoinHandle<()>,
}

impl ArtifactWatcher {
    /// Start watching for an artifact newer than `capture_start_ms`.
    /// The returned receiver resolves at most once.
    pub fn register(
        index: Arc<dyn MediaIndex>,
        capture_start_ms: u64,
        config: WatcherConfig,
    ) -> (Self, oneshot::Receiver<ArtifactRecord>) {
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(run_detection(index, capture_start_ms, config, tx));
        log::debug!("[WATCH] Registered artifact watcher @{}", capture_start_ms);
        (Self { task }, rx)
    }

    pub fn unregister(&self) {
        self.task.abort();
        log::debug!("[WATCH] Unregistered artifact watcher");
    }
}

impl Drop for ArtifactWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_detection(
    index: Arc<dyn MediaIndex>,
    capture_start_ms: u64,
    config: WatcherConfig,
    tx: oneshot::Sender<ArtifactRecord>,
) {
    let gate = DispatchGate::new();
    let mut tx = Some(tx);

    let mut sub = match index.subscribe() {
        Ok(sub) => Some(sub),
        Err(e) => {
            log::warn!("[WATCH] Change subscription unavailable, poll-only: {}", e);
            None
        }
    };

    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The immediate first tick catches an artifact that landed before we
    // started listening.
    let mut polls: u32 = 0;

    loop {
        let found = tokio::select! {
            changed = async {
                match sub.as_mut() {
                    Some(sub) => sub.changed().await,
                    None => None,
                }
            }, if sub.is_some() => {
                match changed {
                    Some(()) => {
                        log::debug!("[WATCH] Change notification received");
                        find_artifact(index.as_ref(), capture_start_ms, &config).await
                    }
                    None => {
                        sub = None;
                        None
                    }
                }
            }
            _ = interval.tick() => {
                polls += 1;
                log::debug!("[WATCH] Poll {}/{}", polls, config.max_polls);
                let found = find_artifact(index.as_ref(), capture_start_ms, &config).await;
                if found.is_none() && polls >= config.max_polls {
                    log::warn!(
                        "[WATCH] No artifact after {} polls, giving up",
                        config.max_polls
                    );
                    return;
                }
                found
            }
        };

        if let Some(record) = found {
            if gate.claim() {
                log::info!(
                    "[WATCH] Artifact found: {} ({} bytes)",
                    record.display_name,
                    record.size_bytes
                );
                if let Some(tx) = tx.take() {
                    let _ = tx.send(record);
                }
            }
            return;
        }
    }
}

/// One converged query pass: newest rows, drift filter, bucket heuristic
/// with stabilized fallback.
async fn find_artifact(
    index: &dyn MediaIndex,
    capture_start_ms: u64,
    config: &WatcherConfig,
) -> Option<ArtifactRecord> {
    let threshold = capture_start_ms.saturating_sub(config.drift_window.as_millis() as u64);
    let rows = index.query_recent(config.max_recent_rows);
    if rows.is_empty() {
        log::debug!("[WATCH] Index query returned no rows");
        return None;
    }

    let mut fallback: Option<ArtifactRecord> = None;
    for row in rows {
        if row.created_ms < threshold {
            log::debug!(
                "[WATCH] Skipping {} (created {} before threshold {})",
                row.display_name,
                row.created_ms,
                threshold
            );
            continue;
        }

        if is_likely_screenshot_bucket(&row.bucket) {
            if let Some(record) = stabilize(&row, config).await {
                return Some(record);
            }
            log::warn!(
                "[WATCH] Likely screenshot {} never stabilized, continuing",
                row.display_name
            );
            continue;
        }

        if fallback.is_none() {
            log::debug!("[WATCH] Fallback candidate from bucket '{}'", row.bucket);
            fallback = stabilize(&row, config).await;
        }
    }

    if fallback.is_some() {
        log::warn!("[WATCH] Using fallback candidate (no bucket match stabilized)");
    }
    fallback
}

/// A just-written file can transiently report size 0 while still being
/// flushed. Poll until a positive size shows up; give up after the budget.
async fn stabilize(row: &MediaRow, config: &WatcherConfig) -> Option<ArtifactRecord> {
    for _ in 0..config.max_stabilize_attempts {
        let size = resolve_file_size(&row.path);
        if size > 0 {
            return Some(ArtifactRecord {
                identity: row.identity.clone(),
                path: row.path.clone(),
                display_name: row.display_name.clone(),
                size_bytes: size,
            });
        }
        tokio::time::sleep(config.stabilize_interval).await;
    }
    None
}

/// Direct stat first, open-handle metadata as the fallback for hosts
/// where a fresh stat lags behind the open file.
fn resolve_file_size(path: &Path) -> u64 {
    if let Ok(meta) = std::fs::metadata(path) {
        if meta.len() > 0 {
            return meta.len();
        }
    }
    if let Ok(file) = std::fs::File::open(path) {
        if let Ok(meta) = file.metadata() {
            return meta.len();
        }
    }
    0
}

fn is_likely_screenshot_bucket(bucket: &str) -> bool {
    if bucket.is_empty() {
        return true;
    }
    let lower = bucket.to_lowercase();
    lower.contains("screenshot") || lower.contains("截屏")
}

/// Current time in epoch milliseconds.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
