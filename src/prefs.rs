//! Persisted capture preferences.
//!
//! Stored as JSON in the platform config directory:
//!   macOS:   ~/Library/Application Support/shotscript/prefs.json
//!   Linux:   ~/.config/shotscript/prefs.json
//!   Windows: %APPDATA%/shotscript/prefs.json

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::script::storage::DEFAULT_SCRIPT_NAME;

/// Which capture channel the user prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    Privileged,
    Assistive,
}

/// Command issued through the privileged shell to trigger the OS
/// screenshot. Injects the screenshot key; hosts override per platform.
pub const DEFAULT_CAPTURE_COMMAND: &str = "input keyevent 120";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapturePrefs {
    pub capture_mode: CaptureMode,
    pub default_script: String,
    pub scripts_enabled: bool,
    pub show_capture_toast: bool,
    pub show_script_success_toast: bool,
    pub show_script_error_toast: bool,
    pub capture_command: String,
    /// Screenshots root override; `None` uses the platform default.
    pub media_root: Option<PathBuf>,
}

impl Default for CapturePrefs {
    fn default() -> Self {
        Self {
            capture_mode: CaptureMode::Privileged,
            default_script: DEFAULT_SCRIPT_NAME.to_string(),
            scripts_enabled: true,
            show_capture_toast: true,
            show_script_success_toast: true,
            show_script_error_toast: true,
            capture_command: DEFAULT_CAPTURE_COMMAND.to_string(),
            media_root: None,
        }
    }
}

/// Owned preferences handle: one instance per process, read at preflight
/// time, written through `update`.
pub struct PrefsStore {
    path: Option<PathBuf>,
    prefs: Mutex<CapturePrefs>,
}

impl PrefsStore {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shotscript")
            .join("prefs.json")
    }

    /// Load from disk; missing or corrupt files fall back to defaults.
    pub fn load(path: PathBuf) -> Self {
        let prefs = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(prefs) => prefs,
                Err(e) => {
                    log::warn!("[PREFS] Corrupt prefs at {}: {}", path.display(), e);
                    CapturePrefs::default()
                }
            },
            Err(_) => CapturePrefs::default(),
        };
        Self {
            path: Some(path),
            prefs: Mutex::new(prefs),
        }
    }

    /// Non-persisted store, for tests and embedding hosts.
    pub fn in_memory(prefs: CapturePrefs) -> Self {
        Self {
            path: None,
            prefs: Mutex::new(prefs),
        }
    }

    /// Snapshot of the current preferences.
    pub fn get(&self) -> CapturePrefs {
        self.prefs.lock().expect("prefs lock poisoned").clone()
    }

    /// Mutate and persist.
    pub fn update(&self, apply: impl FnOnce(&mut CapturePrefs)) -> std::io::Result<()> {
        let snapshot = {
            let mut guard = self.prefs.lock().expect("prefs lock poisoned");
            apply(&mut guard);
            guard.clone()
        };
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let raw = serde_json::to_string_pretty(&snapshot)?;
            std::fs::write(path, raw)?;
        }
        Ok(())
    }
}
