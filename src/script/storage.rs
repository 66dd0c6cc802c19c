//! Script source resolution — user overrides on disk first, then the
//! built-in bundle compiled into the binary.

use std::path::{Path, PathBuf};

use super::ScriptError;

pub const DEFAULT_SCRIPT_NAME: &str = "rotate.rhai";
const SCRIPT_EXTENSION: &str = ".rhai";

/// Built-in automation bundle. A user file with the same name shadows
/// the built-in without deleting it.
const BUILT_IN_SCRIPTS: &[(&str, &str)] = &[
    ("rotate.rhai", include_str!("../../assets/scripts/rotate.rhai")),
    ("quick_share.rhai", include_str!("../../assets/scripts/quick_share.rhai")),
];

pub struct ScriptStorage {
    dir: PathBuf,
}

impl ScriptStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform default scripts directory.
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shotscript")
            .join("scripts")
    }

    /// Resolve a script's source: stored override first, then built-in.
    pub fn load(&self, name: &str) -> Result<String, ScriptError> {
        let path = self.dir.join(name);
        if path.exists() {
            return Ok(std::fs::read_to_string(&path)?);
        }
        BUILT_IN_SCRIPTS
            .iter()
            .find(|(builtin, _)| builtin.eq_ignore_ascii_case(name))
            .map(|(_, source)| source.to_string())
            .ok_or_else(|| ScriptError::NotFound(name.to_string()))
    }

    /// All known script names: built-ins first (in bundle order), then
    /// stored scripts alphabetically.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (builtin, _) in BUILT_IN_SCRIPTS {
            names.push(builtin.to_string());
        }
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            let mut stored: Vec<String> = entries
                .flatten()
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|name| has_script_extension(name))
                .filter(|name| !names.iter().any(|n| n.eq_ignore_ascii_case(name)))
                .collect();
            stored.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
            names.extend(stored);
        }
        names
    }

    pub fn save(&self, name: &str, content: &str) -> Result<(), ScriptError> {
        let path = self.dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Remove a stored override. Built-ins cannot be deleted.
    pub fn delete(&self, name: &str) -> bool {
        let path = self.dir.join(name);
        path.exists() && std::fs::remove_file(&path).is_ok()
    }

    pub fn has_override(&self, name: &str) -> bool {
        self.dir.join(name).exists()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn has_script_extension(name: &str) -> bool {
    name.to_lowercase().ends_with(SCRIPT_EXTENSION)
}
