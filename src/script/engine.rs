//! Script evaluation on a dedicated worker thread.
//!
//! All scripts run on one thread in submission order, so two triggers
//! can never interleave their capability calls. Each run gets a fresh
//! rhai engine with the capability modules registered and the trigger
//! bindings pushed into scope; a failed script poisons nothing.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use rhai::{Dynamic, Scope};
use serde_json::Value;
use tokio::sync::oneshot;

use super::api::{self, FilesApi, ImgApi, ShellApi, UiApi};
use super::{ScriptError, ScriptStorage};

/// The capability surface a worker binds into every script.
#[derive(Clone)]
pub struct Capabilities {
    pub storage: Arc<ScriptStorage>,
    pub img: Arc<ImgApi>,
    pub files: Arc<FilesApi>,
    pub shell: Arc<ShellApi>,
    pub ui: Arc<UiApi>,
}

enum JobSource {
    Named(String),
    Inline(String),
}

struct Job {
    source: JobSource,
    bindings: serde_json::Map<String, Value>,
    done: oneshot::Sender<Result<(), ScriptError>>,
}

/// Handle to the single script worker. Cloning shares the queue.
#[derive(Clone)]
pub struct ScriptEngine {
    queue: mpsc::Sender<Job>,
}

impl ScriptEngine {
    pub fn new(capabilities: Capabilities) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        if let Err(e) = thread::Builder::new()
            .name("script-worker".into())
            .spawn(move || worker_loop(rx, capabilities))
        {
            // Every run on this handle will report the worker as gone.
            log::error!("[ENGINE] Failed to start script worker: {}", e);
        }
        Self { queue: tx }
    }

    /// Run a stored or built-in script by name.
    pub async fn run_by_name(
        &self,
        name: &str,
        bindings: serde_json::Map<String, Value>,
    ) -> Result<(), ScriptError> {
        let rx = self.submit(JobSource::Named(name.to_string()), bindings)?;
        rx.await.map_err(|_| ScriptError::WorkerGone)?
    }

    /// Run ad-hoc source, e.g. an editor test run.
    pub async fn run_inline(
        &self,
        source: &str,
        bindings: serde_json::Map<String, Value>,
    ) -> Result<(), ScriptError> {
        let rx = self.submit(JobSource::Inline(source.to_string()), bindings)?;
        rx.await.map_err(|_| ScriptError::WorkerGone)?
    }

    /// Enqueue synchronously; the returned channel resolves when the
    /// worker finishes the job.
    fn submit(
        &self,
        source: JobSource,
        bindings: serde_json::Map<String, Value>,
    ) -> Result<oneshot::Receiver<Result<(), ScriptError>>, ScriptError> {
        let (done, rx) = oneshot::channel();
        self.queue
            .send(Job {
                source,
                bindings,
                done,
            })
            .map_err(|_| ScriptError::WorkerGone)?;
        Ok(rx)
    }
}

fn worker_loop(rx: mpsc::Receiver<Job>, capabilities: Capabilities) {
    log::info!("[ENGINE] Script worker started");
    while let Ok(job) = rx.recv() {
        let result = run_job(&capabilities, job.source, job.bindings);
        if let Err(err) = &result {
            log::warn!("[ENGINE] Script failed: {}", err);
        }
        let _ = job.done.send(result);
    }
    log::info!("[ENGINE] Script worker stopped");
}

fn run_job(
    capabilities: &Capabilities,
    source: JobSource,
    bindings: serde_json::Map<String, Value>,
) -> Result<(), ScriptError> {
    let (label, source) = match source {
        JobSource::Named(name) => {
            let source = capabilities.storage.load(&name)?;
            (name, source)
        }
        JobSource::Inline(source) => ("<inline>".to_string(), source),
    };
    if source.trim().is_empty() {
        return Err(ScriptError::EmptySource);
    }

    log::info!("[ENGINE] Running '{}'", label);
    let started = std::time::Instant::now();

    let engine = build_engine(capabilities);
    let mut scope = Scope::new();
    for (name, value) in &bindings {
        scope.push_dynamic(name.clone(), json_to_dynamic(value));
    }

    engine
        .run_with_scope(&mut scope, &source)
        .map_err(|e| ScriptError::Eval(e.to_string()))?;

    log::info!("[ENGINE] '{}' finished in {:?}", label, started.elapsed());
    Ok(())
}

/// Fresh engine per run: no state leaks between scripts.
fn build_engine(capabilities: &Capabilities) -> rhai::Engine {
    let mut engine = rhai::Engine::new();
    engine.register_static_module("img", api::img::module(capabilities.img.clone()).into());
    engine.register_static_module("files", api::files::module(capabilities.files.clone()).into());
    engine.register_static_module("shell", api::shell::module(capabilities.shell.clone()).into());
    engine.register_static_module("ui", api::ui::module(capabilities.ui.clone()).into());
    engine.register_fn("log", |message: &str| {
        log::info!("[SCRIPT] {}", message);
    });
    engine
}

fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Dynamic::from(i),
            None => Dynamic::from(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => {
            Dynamic::from(items.iter().map(json_to_dynamic).collect::<rhai::Array>())
        }
        Value::Object(fields) => {
            let mut map = rhai::Map::new();
            for (key, value) in fields {
                map.insert(key.as_str().into(), json_to_dynamic(value));
            }
            Dynamic::from(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::api::HeadlessPrompter;
    use serde_json::json;
    use std::time::{Duration, Instant};

    struct Fixture {
        engine: ScriptEngine,
        _scripts: tempfile::TempDir,
        files_root: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let scripts = tempfile::tempdir().unwrap();
        let files_root = tempfile::tempdir().unwrap();
        let capabilities = Capabilities {
            storage: Arc::new(ScriptStorage::new(scripts.path())),
            img: Arc::new(ImgApi::new()),
            files: Arc::new(FilesApi::new(files_root.path())),
            shell: Arc::new(ShellApi::new("sh")),
            ui: Arc::new(UiApi::new(Arc::new(HeadlessPrompter))),
        };
        Fixture {
            engine: ScriptEngine::new(capabilities),
            _scripts: scripts,
            files_root,
        }
    }

    fn no_bindings() -> serde_json::Map<String, Value> {
        serde_json::Map::new()
    }

    #[tokio::test]
    async fn jobs_run_in_submission_order_one_at_a_time() {
        let f = fixture();
        let started = Instant::now();
        let first = f
            .engine
            .submit(
                JobSource::Inline("shell::exec(\"sleep 0.3\");".into()),
                no_bindings(),
            )
            .unwrap();
        let second = f
            .engine
            .submit(JobSource::Inline("let x = 1;".into()), no_bindings())
            .unwrap();

        // The second job cannot start until the first finishes.
        second.await.unwrap().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn missing_worker_surfaces_as_worker_gone() {
        // A handle whose worker never started (receiver dropped) must
        // report the condition instead of hanging.
        let (tx, rx) = mpsc::channel::<Job>();
        drop(rx);
        let engine = ScriptEngine { queue: tx };
        assert!(matches!(
            engine.run_inline("let x = 1;", no_bindings()).await,
            Err(ScriptError::WorkerGone)
        ));
    }

    #[tokio::test]
    async fn eval_error_does_not_kill_the_worker() {
        let f = fixture();
        let err = f
            .engine
            .run_inline("this is not rhai(", no_bindings())
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::Eval(_)));

        f.engine
            .run_inline("let x = 1 + 1;", no_bindings())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_name_and_empty_source_are_rejected() {
        let f = fixture();
        assert!(matches!(
            f.engine.run_by_name("ghost.rhai", no_bindings()).await,
            Err(ScriptError::NotFound(_))
        ));
        assert!(matches!(
            f.engine.run_inline("   \n  ", no_bindings()).await,
            Err(ScriptError::EmptySource)
        ));
    }

    #[tokio::test]
    async fn bindings_are_visible_including_nested_objects() {
        let f = fixture();
        let mut bindings = no_bindings();
        bindings.insert("answer".into(), json!(41));
        bindings.insert("meta".into(), json!({ "displayName": "shot.png" }));

        f.engine
            .run_inline(
                r#"
                if answer + 1 != 42 { throw "bad int binding"; }
                if meta.displayName != "shot.png" { throw "bad map binding"; }
                if is_def_var("ghost") { throw "phantom binding"; }
                "#,
                bindings,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn capability_modules_are_reachable_from_scripts() {
        let f = fixture();
        f.engine
            .run_inline(
                r#"
                files::write("from_script.txt", "written");
                let out = shell::exec("echo shell-ok");
                if out.code != 0 { throw "shell failed"; }
                "#,
                no_bindings(),
            )
            .await
            .unwrap();
        assert!(f.files_root.path().join("from_script.txt").exists());
    }
}
