//! Trigger pipeline — debounce, preflight, capture dispatch, artifact
//! wait, script run. One linear flow per trigger; every invocation
//! reports exactly one FINISHED to the listener, debounced rejections
//! included.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Notify;

use super::request::{coerce_extras, TriggerRequest};
use crate::capture::{select_action, AssistiveService, CaptureAction, ChannelSnapshot};
use crate::media::watcher::{epoch_ms, ArtifactRecord, ArtifactWatcher, WatcherConfig};
use crate::media::MediaIndex;
use crate::prefs::{CaptureMode, PrefsStore};
use crate::privileged::{ExecResult, PrivilegedExecutor};
use crate::script::storage::DEFAULT_SCRIPT_NAME;
use crate::script::ScriptEngine;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Triggers closer together than this collapse into one.
    pub debounce: Duration,
    /// Budget from dispatch to artifact detection.
    pub capture_timeout: Duration,
    pub watcher: WatcherConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(800),
            capture_timeout: Duration::from_secs(15),
            watcher: WatcherConfig::default(),
        }
    }
}

/// Why a flow stopped short of running the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    MediaPermissionRequired,
    PrivilegedChannelRequired,
    AssistiveChannelRequired,
    PrivilegedBinaryMissing,
    PrivilegedPermissionDenied,
    PrivilegedTimeout,
    PrivilegedInterrupted,
    PrivilegedCommandFailed,
    AssistiveDispatchFailed,
    CaptureTimeout,
}

impl FailureReason {
    pub fn message(&self) -> &'static str {
        match self {
            FailureReason::MediaPermissionRequired => {
                "Screenshot folder is not readable. Grant access and try again."
            }
            FailureReason::PrivilegedChannelRequired => {
                "Privileged capture is not available. Grant elevated access or switch channels."
            }
            FailureReason::AssistiveChannelRequired => {
                "Assistive capture is not connected. Enable it or switch channels."
            }
            FailureReason::PrivilegedBinaryMissing => {
                "Privileged shell binary not found on this system."
            }
            FailureReason::PrivilegedPermissionDenied => {
                "Elevated access was denied. Approve the request and try again."
            }
            FailureReason::PrivilegedTimeout => "Privileged capture command timed out.",
            FailureReason::PrivilegedInterrupted => "Privileged capture command was interrupted.",
            FailureReason::PrivilegedCommandFailed => "Privileged capture command failed.",
            FailureReason::AssistiveDispatchFailed => "Assistive capture could not be dispatched.",
            FailureReason::CaptureTimeout => "No screenshot appeared before the timeout.",
        }
    }
}

/// Host callbacks. All default to no-ops so embedders implement only
/// what they surface.
pub trait PipelineListener: Send + Sync {
    fn on_toast(&self, _message: &str) {}
    fn on_media_permission_required(&self) {}
    fn on_privileged_required(&self) {}
    fn on_assistive_required(&self) {}
    fn on_script_success(&self, _script: &str) {}
    fn on_script_error(&self, _script: &str, _error: &str) {}
    fn on_flow_finished(&self) {}
}

/// Listener for hosts that only want the logs.
impl PipelineListener for () {}

pub struct TriggerPipeline {
    executor: Arc<PrivilegedExecutor>,
    assistive: Arc<dyn AssistiveService>,
    index: Arc<dyn MediaIndex>,
    engine: ScriptEngine,
    prefs: Arc<PrefsStore>,
    listener: Arc<dyn PipelineListener>,
    config: PipelineConfig,
    last_trigger_ms: AtomicU64,
    cancel: Notify,
}

impl TriggerPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executor: Arc<PrivilegedExecutor>,
        assistive: Arc<dyn AssistiveService>,
        index: Arc<dyn MediaIndex>,
        engine: ScriptEngine,
        prefs: Arc<PrefsStore>,
        listener: Arc<dyn PipelineListener>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            executor,
            assistive,
            index,
            engine,
            prefs,
            listener,
            config,
            last_trigger_ms: AtomicU64::new(0),
            cancel: Notify::new(),
        }
    }

    /// Abort an in-flight wait for the artifact. The flow still reports
    /// FINISHED.
    pub fn cancel(&self) {
        log::info!("[FLOW] Cancel requested");
        self.cancel.notify_waiters();
    }

    /// Run one trigger end to end. Debounced triggers skip the flow
    /// entirely but still report finished, so callers never hang on a
    /// rejected invocation.
    pub async fn trigger(&self, request: TriggerRequest) {
        let now = epoch_ms();
        let last = self.last_trigger_ms.load(Ordering::SeqCst);
        if now.saturating_sub(last) < self.config.debounce.as_millis() as u64 {
            log::info!(
                "[FLOW] Debounced trigger from '{}' ({}ms since last)",
                request.origin(),
                now.saturating_sub(last)
            );
            self.listener.on_flow_finished();
            return;
        }
        self.last_trigger_ms.store(now, Ordering::SeqCst);

        log::info!(
            "[FLOW] Trigger accepted: origin='{}' skip_capture={} override={:?}",
            request.origin(),
            request.skip_capture(),
            request.override_script()
        );
        self.run_flow(&request).await;
        log::info!("[FLOW] Finished for origin '{}'", request.origin());
        self.listener.on_flow_finished();
    }

    async fn run_flow(&self, request: &TriggerRequest) {
        if request.skip_capture() {
            self.run_script(None, request).await;
            return;
        }

        if !self.index.is_readable() {
            log::error!("[FLOW] Media index is not readable");
            self.listener.on_media_permission_required();
            self.notify_failure(request, FailureReason::MediaPermissionRequired);
            return;
        }

        // Preflight: the configured mode is authoritative; the alternate
        // channel only covers unavailability, never a failed invocation.
        let prefs = self.prefs.get();
        let prefer_privileged = prefs.capture_mode == CaptureMode::Privileged;
        let snapshot = ChannelSnapshot {
            privileged: if prefer_privileged {
                self.executor.is_available(true).await
            } else {
                false
            },
            assistive: self.assistive.is_connected(),
        };

        // The mode's own channel must be up. A live alternate channel does
        // not rescue the flow; the user picked this mode.
        if prefer_privileged && !snapshot.privileged {
            self.listener.on_privileged_required();
            self.notify_failure(request, FailureReason::PrivilegedChannelRequired);
            return;
        }
        if !prefer_privileged && !snapshot.assistive {
            self.listener.on_assistive_required();
            self.notify_failure(request, FailureReason::AssistiveChannelRequired);
            return;
        }

        // The watcher must be listening before the capture is dispatched,
        // or a fast artifact could land unobserved.
        let capture_start = epoch_ms();
        let (watcher, artifact_rx) = ArtifactWatcher::register(
            self.index.clone(),
            capture_start,
            self.config.watcher.clone(),
        );

        let action = select_action(
            prefer_privileged,
            snapshot,
            self.executor.clone(),
            self.assistive.clone(),
            &prefs.capture_command,
        );

        // Preflight validation guarantees the preferred channel was up, so
        // the selector cannot come back empty-handed here.
        if matches!(action, CaptureAction::Unavailable) {
            watcher.unregister();
            let reason = if prefer_privileged {
                FailureReason::PrivilegedChannelRequired
            } else {
                FailureReason::AssistiveChannelRequired
            };
            self.notify_failure(request, reason);
            return;
        }

        log::info!("[CAPTURE] Dispatching via {} channel", action.name());
        if !action.capture().await {
            watcher.unregister();
            let reason = match action.last_privileged_result().await {
                Some(result) => {
                    let reason = map_privileged_failure(result);
                    if reason == FailureReason::PrivilegedPermissionDenied {
                        self.listener.on_privileged_required();
                    }
                    reason
                }
                None => FailureReason::AssistiveDispatchFailed,
            };
            self.notify_failure(request, reason);
            return;
        }

        let artifact = tokio::select! {
            received = artifact_rx => received.ok(),
            _ = tokio::time::sleep(self.config.capture_timeout) => {
                log::error!(
                    "[CAPTURE] No artifact within {:?}",
                    self.config.capture_timeout
                );
                None
            }
            _ = self.cancel.notified() => {
                log::warn!("[CAPTURE] Wait cancelled");
                watcher.unregister();
                return;
            }
        };
        drop(watcher);

        let Some(artifact) = artifact else {
            self.notify_failure(request, FailureReason::CaptureTimeout);
            return;
        };

        log::info!(
            "[CAPTURE] Artifact ready: {} ({} bytes)",
            artifact.display_name,
            artifact.size_bytes
        );
        if prefs.show_capture_toast && !request.suppress_feedback() {
            self.listener
                .on_toast(&format!("Captured {}", artifact.display_name));
        }

        self.run_script(Some(&artifact), request).await;
    }

    async fn run_script(&self, artifact: Option<&ArtifactRecord>, request: &TriggerRequest) {
        let prefs = self.prefs.get();
        if !prefs.scripts_enabled {
            log::info!("[FLOW] Scripts disabled, skipping automation");
            if prefs.show_script_success_toast && !request.suppress_feedback() {
                self.listener
                    .on_toast("Automation scripts are disabled; skipping script");
            }
            return;
        }

        let name = request
            .override_script()
            .map(str::to_string)
            .or_else(|| {
                let configured = prefs.default_script.trim();
                (!configured.is_empty()).then(|| configured.to_string())
            })
            .unwrap_or_else(|| DEFAULT_SCRIPT_NAME.to_string());

        let bindings = build_bindings(artifact, request, &name);
        log::info!("[FLOW] Running script '{}'", name);
        match self.engine.run_by_name(&name, bindings).await {
            Ok(()) => {
                self.listener.on_script_success(&name);
                if prefs.show_script_success_toast && !request.suppress_feedback() {
                    self.listener.on_toast(&format!("Script '{}' finished", name));
                }
            }
            Err(err) => {
                log::error!("[FLOW] Script '{}' failed: {}", name, err);
                self.listener.on_script_error(&name, &err.to_string());
                if prefs.show_script_error_toast && !request.suppress_feedback() {
                    self.listener
                        .on_toast(&format!("Script '{}' failed: {}", name, err));
                }
            }
        }
    }

    fn notify_failure(&self, request: &TriggerRequest, reason: FailureReason) {
        log::error!("[FLOW] Flow failed: {:?}", reason);
        if !request.suppress_feedback() {
            self.listener.on_toast(reason.message());
        }
    }
}

fn map_privileged_failure(result: ExecResult) -> FailureReason {
    match result {
        ExecResult::BinaryNotFound => FailureReason::PrivilegedBinaryMissing,
        ExecResult::PermissionDenied => FailureReason::PrivilegedPermissionDenied,
        ExecResult::Timeout => FailureReason::PrivilegedTimeout,
        ExecResult::Interrupted => FailureReason::PrivilegedInterrupted,
        ExecResult::Success | ExecResult::CommandFailed => FailureReason::PrivilegedCommandFailed,
    }
}

/// Scope bindings for one script run. `screenshot_path` is absent on
/// skip-capture runs; scripts probe it with `is_def_var`.
fn build_bindings(
    artifact: Option<&ArtifactRecord>,
    request: &TriggerRequest,
    script_name: &str,
) -> serde_json::Map<String, serde_json::Value> {
    let mut bindings = serde_json::Map::new();

    if let Some(artifact) = artifact {
        let path = artifact.path.to_string_lossy().into_owned();
        bindings.insert("screenshot_path".into(), json!(path.clone()));
        bindings.insert(
            "screenshot_meta".into(),
            json!({
                "displayName": artifact.display_name,
                "sizeBytes": artifact.size_bytes as i64,
                "identity": artifact.identity,
                "path": path,
            }),
        );
    }

    let mut env = serde_json::Map::new();
    env.insert("source".into(), json!(request.origin()));
    env.insert("silent".into(), json!(request.is_silent()));
    env.insert("suppressFeedback".into(), json!(request.suppress_feedback()));
    env.insert("skipCapture".into(), json!(request.skip_capture()));
    env.insert("scriptName".into(), json!(script_name));
    if let Some(requested) = request.override_script() {
        env.insert("requestedScriptName".into(), json!(requested));
    }
    env.insert("timestamp".into(), json!(epoch_ms() as i64));
    if let Some(action) = request.action() {
        env.insert("action".into(), json!(action));
    }
    env.insert("extras".into(), json!(coerce_extras(request.extras())));
    bindings.insert("env".into(), serde_json::Value::Object(env));

    bindings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FsMediaIndex;
    use crate::prefs::CapturePrefs;
    use crate::script::api::{FilesApi, HeadlessPrompter, ImgApi, ShellApi, UiApi};
    use crate::script::engine::Capabilities;
    use crate::script::ScriptStorage;
    use crate::trigger::{TriggerEvent, TriggerRequest};
    use std::path::PathBuf;
    use std::sync::Mutex;

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
        fn on_media_permission_required(&self) {
            self.push("media_permission_required");
        }
        fn on_privileged_required(&self) {
            self.push("privileged_required");
        }
        fn on_assistive_required(&self) {
            self.push("assistive_required");
        }
        fn on_script_success(&self, script: &str) {
            self.push(format!("script_success:{}", script));
        }
        fn on_script_error(&self, script: &str, error: &str) {
            self.push(format!("script_error:{}:{}", script, error));
        }
        fn on_flow_finished(&self) {
            self.push("finished");
        }
    }

    /// Assistive service that drops a finished PNG into the screenshots
    /// directory, as a real compositor capture would.
    struct WritingAssistive {
        dir: PathBuf,
        connected: bool,
    }

    impl AssistiveService for WritingAssistive {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn request_screenshot(&self) -> bool {
            if !self.connected {
                return false;
            }
            let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([9, 9, 9, 255]));
            img.save(self.dir.join(format!("shot_{}.png", epoch_ms())))
                .is_ok()
        }
    }

    /// Connected but never produces a file.
    struct SilentAssistive;

    impl AssistiveService for SilentAssistive {
        fn is_connected(&self) -> bool {
            true
        }

        fn request_screenshot(&self) -> bool {
            true
        }
    }

    struct Fixture {
        pipeline: TriggerPipeline,
        listener: Arc<RecordingListener>,
        files_root: PathBuf,
        _media: tempfile::TempDir,
        _scripts: tempfile::TempDir,
        _files: tempfile::TempDir,
    }

    fn fixture(
        prefs: CapturePrefs,
        shell: &str,
        assistive: Arc<dyn AssistiveService>,
        index: Option<Arc<dyn MediaIndex>>,
        config: PipelineConfig,
    ) -> Fixture {
        let media = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(media.path().join("Screenshots")).unwrap();
        let scripts = tempfile::tempdir().unwrap();
        let files = tempfile::tempdir().unwrap();

        let capabilities = Capabilities {
            storage: Arc::new(ScriptStorage::new(scripts.path())),
            img: Arc::new(ImgApi::new()),
            files: Arc::new(FilesApi::new(files.path())),
            shell: Arc::new(ShellApi::new("sh")),
            ui: Arc::new(UiApi::new(Arc::new(HeadlessPrompter))),
        };

        let listener = Arc::new(RecordingListener::default());
        let index =
            index.unwrap_or_else(|| Arc::new(FsMediaIndex::new(media.path())) as Arc<dyn MediaIndex>);
        let pipeline = TriggerPipeline::new(
            Arc::new(PrivilegedExecutor::with_shell(shell)),
            assistive,
            index,
            ScriptEngine::new(capabilities),
            Arc::new(PrefsStore::in_memory(prefs)),
            listener.clone(),
            config,
        );
        Fixture {
            pipeline,
            listener,
            files_root: files.path().to_path_buf(),
            _media: media,
            _scripts: scripts,
            _files: files,
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            debounce: Duration::from_millis(0),
            capture_timeout: Duration::from_millis(400),
            watcher: WatcherConfig {
                poll_interval: Duration::from_millis(50),
                max_polls: 40,
                stabilize_interval: Duration::from_millis(20),
                max_stabilize_attempts: 10,
                drift_window: Duration::from_secs(5),
                max_recent_rows: 5,
            },
        }
    }

    fn skip_capture_request() -> TriggerRequest {
        TriggerRequest::from_event(TriggerEvent {
            skip_capture: Some(true),
            ..Default::default()
        })
    }

    fn scriptless_prefs() -> CapturePrefs {
        CapturePrefs {
            scripts_enabled: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn rapid_triggers_collapse_but_each_reports_finished() {
        let mut config = fast_config();
        config.debounce = Duration::from_secs(10);
        let f = fixture(
            CapturePrefs::default(),
            "sh",
            Arc::new(SilentAssistive),
            None,
            config,
        );

        let request = || {
            TriggerRequest::from_event(TriggerEvent {
                skip_capture: Some(true),
                script_name: Some("ghost.rhai".to_string()),
                ..Default::default()
            })
        };
        f.pipeline.trigger(request()).await;
        f.pipeline.trigger(request()).await;
        f.pipeline.trigger(request()).await;

        let events = f.listener.events();
        // Every invocation finishes, even the rejected ones.
        let finishes = events.iter().filter(|e| *e == "finished").count();
        assert_eq!(finishes, 3);
        // Only the first trigger actually reached the script stage.
        let runs = events
            .iter()
            .filter(|e| e.starts_with("script_error:"))
            .count();
        assert_eq!(runs, 1);
    }

    #[tokio::test]
    async fn privileged_mode_ignores_a_live_assistive_channel() {
        // Privileged shell missing, assistive connected: the configured
        // mode still decides, so preflight must fail instead of quietly
        // capturing through the other channel.
        let f = fixture(
            scriptless_prefs(),
            "shotscript-no-such-shell",
            Arc::new(SilentAssistive),
            None,
            fast_config(),
        );

        f.pipeline
            .trigger(TriggerRequest::from_event(TriggerEvent::default()))
            .await;

        let events = f.listener.events();
        assert!(events.contains(&"privileged_required".to_string()), "{:?}", events);
        assert!(events.iter().any(|e| e
            .starts_with("toast:")
            && e.contains(FailureReason::PrivilegedChannelRequired.message())));
        assert!(!events.iter().any(|e| e.starts_with("toast:Captured")));
        assert_eq!(events.last().map(String::as_str), Some("finished"));
    }

    #[tokio::test]
    async fn disabled_scripts_surface_a_notice_instead_of_running() {
        let f = fixture(
            scriptless_prefs(),
            "sh",
            Arc::new(SilentAssistive),
            None,
            fast_config(),
        );

        f.pipeline.trigger(skip_capture_request()).await;
        let events = f.listener.events();
        assert!(events
            .iter()
            .any(|e| e.starts_with("toast:") && e.contains("disabled")));
        assert!(!events.iter().any(|e| e.starts_with("script_")));

        // A feedback-suppressed request stays quiet.
        f.pipeline
            .trigger(TriggerRequest::from_event(TriggerEvent {
                skip_capture: Some(true),
                suppress_feedback: Some(true),
                ..Default::default()
            }))
            .await;
        let disabled_toasts = f
            .listener
            .events()
            .iter()
            .filter(|e| e.starts_with("toast:") && e.contains("disabled"))
            .count();
        assert_eq!(disabled_toasts, 1);
    }

    #[tokio::test]
    async fn unreadable_media_index_requests_permission_and_finishes() {
        let index: Arc<dyn MediaIndex> =
            Arc::new(FsMediaIndex::new("/nonexistent/shotscript-test-root"));
        let f = fixture(
            scriptless_prefs(),
            "sh",
            Arc::new(SilentAssistive),
            Some(index),
            fast_config(),
        );

        f.pipeline
            .trigger(TriggerRequest::from_event(TriggerEvent::default()))
            .await;

        let events = f.listener.events();
        assert!(events.contains(&"media_permission_required".to_string()));
        assert_eq!(events.last().map(String::as_str), Some("finished"));
    }

    #[tokio::test]
    async fn assistive_mode_never_falls_back_to_privileged() {
        let prefs = CapturePrefs {
            capture_mode: CaptureMode::Assistive,
            scripts_enabled: false,
            ..Default::default()
        };
        // Privileged would work ("sh"), but the configured mode is
        // assistive and the service is disconnected.
        let f = fixture(
            prefs,
            "sh",
            Arc::new(WritingAssistive {
                dir: PathBuf::new(),
                connected: false,
            }),
            None,
            fast_config(),
        );

        f.pipeline
            .trigger(TriggerRequest::from_event(TriggerEvent::default()))
            .await;

        let events = f.listener.events();
        assert!(events.contains(&"assistive_required".to_string()));
        assert!(!events.contains(&"privileged_required".to_string()));
    }

    #[tokio::test]
    async fn privileged_mode_without_any_channel_requests_privilege() {
        let f = fixture(
            scriptless_prefs(),
            "shotscript-no-such-shell",
            Arc::new(WritingAssistive {
                dir: PathBuf::new(),
                connected: false,
            }),
            None,
            fast_config(),
        );

        f.pipeline
            .trigger(TriggerRequest::from_event(TriggerEvent::default()))
            .await;

        assert!(f
            .listener
            .events()
            .contains(&"privileged_required".to_string()));
    }

    #[tokio::test]
    async fn denied_capture_command_maps_to_permission_toast() {
        let prefs = CapturePrefs {
            capture_command: "exit 255".to_string(),
            scripts_enabled: false,
            ..Default::default()
        };
        let f = fixture(prefs, "sh", Arc::new(SilentAssistive), None, fast_config());

        f.pipeline
            .trigger(TriggerRequest::from_event(TriggerEvent::default()))
            .await;

        let events = f.listener.events();
        assert!(events.contains(&"privileged_required".to_string()));
        assert!(events.iter().any(|e| e
            .starts_with("toast:")
            && e.contains(FailureReason::PrivilegedPermissionDenied.message())));
        assert_eq!(events.last().map(String::as_str), Some("finished"));
    }

    #[tokio::test]
    async fn dispatch_without_artifact_times_out() {
        let prefs = CapturePrefs {
            capture_mode: CaptureMode::Assistive,
            scripts_enabled: false,
            ..Default::default()
        };
        let f = fixture(prefs, "sh", Arc::new(SilentAssistive), None, fast_config());

        f.pipeline
            .trigger(TriggerRequest::from_event(TriggerEvent::default()))
            .await;

        let events = f.listener.events();
        assert!(events
            .iter()
            .any(|e| e.contains(FailureReason::CaptureTimeout.message())));
        assert_eq!(events.last().map(String::as_str), Some("finished"));
    }

    #[tokio::test]
    async fn full_assistive_flow_binds_the_artifact_into_the_script() {
        let media = tempfile::tempdir().unwrap();
        let shots = media.path().join("Screenshots");
        std::fs::create_dir_all(&shots).unwrap();
        let scripts = tempfile::tempdir().unwrap();

        let storage = ScriptStorage::new(scripts.path());
        storage
            .save(
                "mark.rhai",
                r#"
                if !is_def_var("screenshot_path") { throw "no artifact bound"; }
                if screenshot_meta.sizeBytes <= 0 { throw "empty artifact"; }
                files::write("marker.txt", screenshot_path);
                "#,
            )
            .unwrap();

        let files = tempfile::tempdir().unwrap();
        let capabilities = Capabilities {
            storage: Arc::new(storage),
            img: Arc::new(ImgApi::new()),
            files: Arc::new(FilesApi::new(files.path())),
            shell: Arc::new(ShellApi::new("sh")),
            ui: Arc::new(UiApi::new(Arc::new(HeadlessPrompter))),
        };

        let prefs = CapturePrefs {
            capture_mode: CaptureMode::Assistive,
            ..Default::default()
        };
        let listener = Arc::new(RecordingListener::default());
        let pipeline = TriggerPipeline::new(
            Arc::new(PrivilegedExecutor::with_shell("sh")),
            Arc::new(WritingAssistive {
                dir: shots.clone(),
                connected: true,
            }),
            Arc::new(FsMediaIndex::new(media.path())),
            ScriptEngine::new(capabilities),
            Arc::new(PrefsStore::in_memory(prefs)),
            listener.clone(),
            PipelineConfig {
                capture_timeout: Duration::from_secs(5),
                ..fast_config()
            },
        );

        pipeline
            .trigger(TriggerRequest::from_event(TriggerEvent {
                script_name: Some("mark.rhai".to_string()),
                ..Default::default()
            }))
            .await;

        let events = listener.events();
        assert!(
            events.contains(&"script_success:mark.rhai".to_string()),
            "events: {:?}",
            events
        );
        let marker = std::fs::read_to_string(files.path().join("marker.txt")).unwrap();
        assert!(marker.contains("shot_"));
        assert_eq!(events.last().map(String::as_str), Some("finished"));
    }

    #[tokio::test]
    async fn script_error_is_reported_but_flow_still_finishes() {
        let prefs = CapturePrefs::default();
        let f = fixture(prefs, "sh", Arc::new(SilentAssistive), None, fast_config());

        f.pipeline
            .trigger(TriggerRequest::from_event(TriggerEvent {
                skip_capture: Some(true),
                script_name: Some("ghost.rhai".to_string()),
                ..Default::default()
            }))
            .await;

        let events = f.listener.events();
        assert!(events.iter().any(|e| e.starts_with("script_error:ghost.rhai")));
        assert_eq!(events.last().map(String::as_str), Some("finished"));
        let _ = &f.files_root;
    }
}
