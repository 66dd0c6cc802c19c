//! shotscript CLI — wires the pipeline together and fires one trigger.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use shotscript::capture::CompositorCapture;
use shotscript::media::FsMediaIndex;
use shotscript::prefs::{CaptureMode, PrefsStore};
use shotscript::privileged::PrivilegedExecutor;
use shotscript::script::api::{FilesApi, HeadlessPrompter, ImgApi, ShellApi, UiApi};
use shotscript::script::engine::Capabilities;
use shotscript::script::{ScriptEngine, ScriptStorage};
use shotscript::trigger::pipeline::{PipelineConfig, PipelineListener, TriggerPipeline};
use shotscript::trigger::{origin, TriggerEvent, TriggerRequest};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Privileged,
    Assistive,
}

impl From<ModeArg> for CaptureMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Privileged => CaptureMode::Privileged,
            ModeArg::Assistive => CaptureMode::Assistive,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "shotscript", version, about = "Capture the screen and run an automation script against it")]
struct Cli {
    /// Script to run instead of the configured default.
    #[arg(long)]
    script: Option<String>,

    /// Run the script without capturing first.
    #[arg(long)]
    skip_capture: bool,

    /// Suppress toasts and other feedback.
    #[arg(long)]
    quiet: bool,

    /// Origin tag passed through to the script's `env.source`.
    #[arg(long)]
    origin: Option<String>,

    /// Extra script binding as key=value. JSON values are parsed;
    /// anything else binds as a string. Repeatable.
    #[arg(long = "extra", value_name = "KEY=VALUE")]
    extras: Vec<String>,

    /// Screenshots root to watch (defaults to the configured or
    /// platform location).
    #[arg(long)]
    media_root: Option<PathBuf>,

    /// Capture channel for this run, without persisting the change.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// List known scripts and exit.
    #[arg(long)]
    list_scripts: bool,
}

/// Routes pipeline feedback into the log.
struct LogListener;

impl PipelineListener for LogListener {
    fn on_toast(&self, message: &str) {
        log::info!("[UI] toast: {}", message);
    }

    fn on_media_permission_required(&self) {
        log::error!("[UI] Media access required — check the screenshots directory");
    }

    fn on_privileged_required(&self) {
        log::error!("[UI] Privileged access required — grant elevation or switch channels");
    }

    fn on_assistive_required(&self) {
        log::error!("[UI] Assistive capture unavailable — no reachable display");
    }

    fn on_script_error(&self, script: &str, error: &str) {
        log::error!("[UI] Script '{}' failed: {}", script, error);
    }
}

fn parse_extras(raw: &[String]) -> serde_json::Map<String, serde_json::Value> {
    let mut extras = serde_json::Map::new();
    for item in raw {
        let Some((key, value)) = item.split_once('=') else {
            log::warn!("[CLI] Ignoring malformed extra '{}'", item);
            continue;
        };
        let parsed = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        extras.insert(key.to_string(), parsed);
    }
    extras
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let storage = ScriptStorage::new(ScriptStorage::default_dir());
    if cli.list_scripts {
        for name in storage.list() {
            println!("{}", name);
        }
        return;
    }

    // Per-run overrides stay in memory; only explicit settings changes
    // persist.
    let mut prefs = PrefsStore::load(PrefsStore::default_path()).get();
    if let Some(mode) = cli.mode {
        prefs.capture_mode = mode.into();
    }
    if let Some(root) = &cli.media_root {
        prefs.media_root = Some(root.clone());
    }
    let media_root = prefs
        .media_root
        .clone()
        .unwrap_or_else(FsMediaIndex::default_root);
    let prefs = Arc::new(PrefsStore::in_memory(prefs));

    let executor = Arc::new(PrivilegedExecutor::new());
    let capabilities = Capabilities {
        storage: Arc::new(storage),
        img: Arc::new(ImgApi::new()),
        files: Arc::new(FilesApi::new(FilesApi::default_root())),
        shell: Arc::new(ShellApi::new(executor.shell().to_string())),
        ui: Arc::new(UiApi::new(Arc::new(HeadlessPrompter))),
    };

    let pipeline = TriggerPipeline::new(
        executor,
        Arc::new(CompositorCapture::new(media_root.clone())),
        Arc::new(FsMediaIndex::new(media_root)),
        ScriptEngine::new(capabilities),
        prefs,
        Arc::new(LogListener),
        PipelineConfig::default(),
    );

    let request = TriggerRequest::from_event(TriggerEvent {
        action: None,
        script_name: cli.script,
        silent: Some(true),
        suppress_feedback: Some(cli.quiet),
        skip_capture: Some(cli.skip_capture),
        origin: Some(cli.origin.unwrap_or_else(|| origin::CLI.to_string())),
        extras: parse_extras(&cli.extras),
    });
    pipeline.trigger(request).await;
}
