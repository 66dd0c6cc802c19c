//! End-to-end pipeline flows through the public API, with a fake
//! assistive service standing in for the compositor.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shotscript::capture::AssistiveService;
use shotscript::media::watcher::WatcherConfig;
use shotscript::media::FsMediaIndex;
use shotscript::prefs::{CaptureMode, CapturePrefs, PrefsStore};
use shotscript::privileged::PrivilegedExecutor;
use shotscript::script::api::{FilesApi, HeadlessPrompter, ImgApi, ShellApi, UiApi};
use shotscript::script::engine::Capabilities;
use shotscript::script::{ScriptEngine, ScriptStorage};
use shotscript::trigger::pipeline::{PipelineConfig, PipelineListener, TriggerPipeline};
use shotscript::trigger::{TriggerEvent, TriggerRequest};

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

impl PipelineListener for RecordingListener {
    fn on_toast(&self, message: &str) {
        self.push(format!("toast:{}", message));
    }
    fn on_script_success(&self, script: &str) {
        self.push(format!("success:{}", script));
    }
    fn on_script_error(&self, script: &str, error: &str) {
        self.push(format!("error:{}:{}", script, error));
    }
    fn on_flow_finished(&self) {
        self.push("finished");
    }
}

struct FakeCompositor {
    dir: PathBuf,
}

impl AssistiveService for FakeCompositor {
    fn is_connected(&self) -> bool {
        true
    }

    fn request_screenshot(&self) -> bool {
        let img = image::RgbaImage::from_pixel(16, 16, image::Rgba([1, 2, 3, 255]));
        let name = format!(
            "screenshot_{}.png",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_millis()
        );
        img.save(self.dir.join(name)).is_ok()
    }
}

struct Harness {
    pipeline: TriggerPipeline,
    listener: Arc<RecordingListener>,
    files_root: PathBuf,
    _media: tempfile::TempDir,
    _scripts: tempfile::TempDir,
    _files: tempfile::TempDir,
}

fn harness(prefs: CapturePrefs, script: Option<(&str, &str)>) -> Harness {
    let media = tempfile::tempdir().unwrap();
    let shots = media.path().join("Screenshots");
    std::fs::create_dir_all(&shots).unwrap();
    let scripts = tempfile::tempdir().unwrap();
    let files = tempfile::tempdir().unwrap();

    let storage = ScriptStorage::new(scripts.path());
    if let Some((name, source)) = script {
        storage.save(name, source).unwrap();
    }

    let capabilities = Capabilities {
        storage: Arc::new(storage),
        img: Arc::new(ImgApi::new()),
        files: Arc::new(FilesApi::new(files.path())),
        shell: Arc::new(ShellApi::new("sh")),
        ui: Arc::new(UiApi::new(Arc::new(HeadlessPrompter))),
    };

    let listener = Arc::new(RecordingListener::default());
    let pipeline = TriggerPipeline::new(
        Arc::new(PrivilegedExecutor::with_shell("sh")),
        Arc::new(FakeCompositor { dir: shots }),
        Arc::new(FsMediaIndex::new(media.path())),
        ScriptEngine::new(capabilities),
        Arc::new(PrefsStore::in_memory(prefs)),
        listener.clone(),
        PipelineConfig {
            debounce: Duration::from_millis(0),
            capture_timeout: Duration::from_secs(5),
            watcher: WatcherConfig {
                poll_interval: Duration::from_millis(50),
                stabilize_interval: Duration::from_millis(20),
                ..Default::default()
            },
        },
    );

    Harness {
        pipeline,
        listener,
        files_root: files.path().to_path_buf(),
        _media: media,
        _scripts: scripts,
        _files: files,
    }
}

fn assistive_prefs() -> CapturePrefs {
    CapturePrefs {
        capture_mode: CaptureMode::Assistive,
        ..Default::default()
    }
}

#[tokio::test]
async fn skip_capture_runs_the_override_script_without_an_artifact() {
    let h = harness(
        assistive_prefs(),
        Some((
            "probe.rhai",
            r#"
            if is_def_var("screenshot_path") { throw "unexpected artifact"; }
            if env.skipCapture != true { throw "skipCapture not set"; }
            files::write("ran.txt", env.scriptName);
            "#,
        )),
    );

    h.pipeline
        .trigger(TriggerRequest::from_event(TriggerEvent {
            skip_capture: Some(true),
            script_name: Some("probe.rhai".to_string()),
            ..Default::default()
        }))
        .await;

    let events = h.listener.events();
    assert!(events.contains(&"success:probe.rhai".to_string()), "{:?}", events);
    assert_eq!(events.last().map(String::as_str), Some("finished"));
    let marker = std::fs::read_to_string(h.files_root.join("ran.txt")).unwrap();
    assert_eq!(marker, "probe.rhai");
}

#[tokio::test]
async fn captured_artifact_flows_into_the_script_bindings() {
    let h = harness(
        assistive_prefs(),
        Some((
            "inspect.rhai",
            r#"
            if !is_def_var("screenshot_path") { throw "no artifact"; }
            let info = img::info(screenshot_path);
            if info.width != 16 { throw "unexpected width " + info.width; }
            files::write("artifact.txt", screenshot_meta.displayName);
            "#,
        )),
    );

    h.pipeline
        .trigger(TriggerRequest::from_event(TriggerEvent {
            script_name: Some("inspect.rhai".to_string()),
            ..Default::default()
        }))
        .await;

    let events = h.listener.events();
    assert!(events.contains(&"success:inspect.rhai".to_string()), "{:?}", events);
    let name = std::fs::read_to_string(h.files_root.join("artifact.txt")).unwrap();
    assert!(name.starts_with("screenshot_") && name.ends_with(".png"));
}

#[tokio::test]
async fn quiet_requests_suppress_all_toasts() {
    let h = harness(
        assistive_prefs(),
        Some(("noop.rhai", "let x = 1;")),
    );

    h.pipeline
        .trigger(TriggerRequest::from_event(TriggerEvent {
            script_name: Some("noop.rhai".to_string()),
            suppress_feedback: Some(true),
            ..Default::default()
        }))
        .await;

    let events = h.listener.events();
    assert!(events.contains(&"success:noop.rhai".to_string()), "{:?}", events);
    assert!(!events.iter().any(|e| e.starts_with("toast:")));
}

#[tokio::test]
async fn extras_reach_the_script_through_env() {
    let mut extras = serde_json::Map::new();
    extras.insert("label".into(), serde_json::json!("hello"));
    extras.insert("nested".into(), serde_json::json!({"dropped": true}));

    let h = harness(
        assistive_prefs(),
        Some((
            "extras.rhai",
            r#"
            if env.extras.label != "hello" { throw "missing extra"; }
            if "nested" in env.extras { throw "unsupported extra leaked through"; }
            "#,
        )),
    );

    h.pipeline
        .trigger(TriggerRequest::from_event(TriggerEvent {
            skip_capture: Some(true),
            script_name: Some("extras.rhai".to_string()),
            extras,
            ..Default::default()
        }))
        .await;

    let events = h.listener.events();
    assert!(events.contains(&"success:extras.rhai".to_string()), "{:?}", events);
}
