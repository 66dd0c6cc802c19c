//! File capability — read/write/list/exists, sandboxed to an
//! app-private root unless the script passes an absolute path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rhai::{Array, Dynamic, EvalAltResult, Module};

pub struct FilesApi {
    root: PathBuf,
}

impl FilesApi {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shotscript")
            .join("files")
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }

    pub fn read(&self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(self.resolve(path))
    }

    pub fn write(&self, path: &str, content: &str) -> std::io::Result<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, content)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    pub fn list(&self, dir: &str) -> Vec<String> {
        let target = self.resolve(dir);
        match std::fs::read_dir(target) {
            Ok(entries) => entries
                .flatten()
                .filter_map(|e| e.file_name().into_string().ok())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Build the `files` rhai module over a shared API handle.
pub fn module(api: Arc<FilesApi>) -> Module {
    let mut module = Module::new();

    let handle = api.clone();
    module.set_native_fn("read", move |path: &str| {
        handle
            .read(path)
            .map_err(|e| -> Box<EvalAltResult> { format!("files::read {}: {}", path, e).into() })
    });

    let handle = api.clone();
    module.set_native_fn("write", move |path: &str, content: &str| {
        handle
            .write(path, content)
            .map(|_| true)
            .map_err(|e| -> Box<EvalAltResult> { format!("files::write {}: {}", path, e).into() })
    });

    let handle = api.clone();
    module.set_native_fn("exists", move |path: &str| Ok(handle.exists(path)));

    let handle = api;
    module.set_native_fn("list", move |dir: &str| {
        Ok(handle
            .list(dir)
            .into_iter()
            .map(Dynamic::from)
            .collect::<Array>())
    });

    module
}
