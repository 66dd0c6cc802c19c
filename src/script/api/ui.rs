//! UI capability — toasts, menus, a date picker and progress notices.
//!
//! Prompts are relayed to a host-provided [`Prompter`] and the script
//! worker blocks on the reply with a bounded timeout; an unanswered or
//! timed-out prompt reads as cancelled, never as an error. The shipped
//! headless prompter cancels everything immediately.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use rhai::{Array, Dynamic, Module};

/// How long a script will wait for the user before giving up.
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(45);

/// A prompt relayed to the UI collaborator.
#[derive(Debug, Clone)]
pub enum UiRequest {
    Menu {
        title: String,
        options: Vec<String>,
        multi: bool,
    },
    DatePicker {
        title: String,
        initial_ms: i64,
    },
}

#[derive(Debug, Clone)]
pub struct PromptResult {
    pub cancelled: bool,
    pub indexes: Vec<i64>,
    pub date_ms: i64,
}

impl PromptResult {
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            indexes: Vec::new(),
            date_ms: -1,
        }
    }

    pub fn selection(indexes: Vec<i64>) -> Self {
        Self {
            cancelled: false,
            indexes,
            date_ms: -1,
        }
    }

    pub fn date(date_ms: i64) -> Self {
        Self {
            cancelled: false,
            indexes: Vec::new(),
            date_ms,
        }
    }
}

/// Host-side UI collaborator. Implementations reply through the channel
/// whenever the user gets around to it; the API enforces the timeout.
pub trait Prompter: Send + Sync {
    fn toast(&self, message: &str);

    fn prompt(&self, request: UiRequest, reply: mpsc::Sender<PromptResult>);

    fn progress(&self, id: i64, title: &str, message: &str, current: i64, total: i64, done: bool) {
        log::info!(
            "[UI] progress #{} '{}' {}/{} done={} — {}",
            id,
            title,
            current,
            total,
            done,
            message
        );
    }
}

/// Prompter for headless hosts: toasts go to the log, prompts cancel.
pub struct HeadlessPrompter;

impl Prompter for HeadlessPrompter {
    fn toast(&self, message: &str) {
        log::info!("[UI] toast: {}", message);
    }

    fn prompt(&self, request: UiRequest, reply: mpsc::Sender<PromptResult>) {
        log::debug!("[UI] headless host, cancelling prompt {:?}", request);
        let _ = reply.send(PromptResult::cancelled());
    }
}

pub struct UiApi {
    prompter: Arc<dyn Prompter>,
    timeout: Duration,
    next_progress_id: AtomicI64,
}

impl UiApi {
    pub fn new(prompter: Arc<dyn Prompter>) -> Self {
        Self::with_timeout(prompter, PROMPT_TIMEOUT)
    }

    pub fn with_timeout(prompter: Arc<dyn Prompter>, timeout: Duration) -> Self {
        Self {
            prompter,
            timeout,
            next_progress_id: AtomicI64::new(2000),
        }
    }

    pub fn toast(&self, message: &str) {
        self.prompter.toast(message);
    }

    /// Single-select menu. Returns the chosen index or -1 when
    /// cancelled/timed out.
    pub fn menu(&self, title: &str, options: Vec<String>) -> i64 {
        if options.is_empty() {
            return -1;
        }
        let result = self.await_prompt(UiRequest::Menu {
            title: title.to_string(),
            options,
            multi: false,
        });
        if result.cancelled {
            return -1;
        }
        result.indexes.first().copied().unwrap_or(-1)
    }

    /// Multi-select menu. Empty on cancel/timeout.
    pub fn menu_multi(&self, title: &str, options: Vec<String>) -> Vec<i64> {
        if options.is_empty() {
            return Vec::new();
        }
        let result = self.await_prompt(UiRequest::Menu {
            title: title.to_string(),
            options,
            multi: true,
        });
        if result.cancelled {
            return Vec::new();
        }
        result.indexes
    }

    /// Date picker. Returns epoch milliseconds or -1 when cancelled.
    pub fn pick_date(&self, title: &str, initial_ms: i64) -> i64 {
        let initial_ms = if initial_ms > 0 {
            initial_ms
        } else {
            crate::media::watcher::epoch_ms() as i64
        };
        let result = self.await_prompt(UiRequest::DatePicker {
            title: title.to_string(),
            initial_ms,
        });
        if result.cancelled || result.date_ms <= 0 {
            return -1;
        }
        result.date_ms
    }

    pub fn progress_start(&self, title: &str, message: &str, total: i64) -> i64 {
        let id = self.next_progress_id.fetch_add(1, Ordering::SeqCst);
        self.prompter.progress(id, title, message, 0, total.max(0), false);
        id
    }

    pub fn progress_update(&self, id: i64, title: &str, message: &str, current: i64, total: i64) {
        if id <= 0 {
            return;
        }
        self.prompter
            .progress(id, title, message, current.max(0), total.max(0), false);
    }

    pub fn progress_finish(&self, id: i64, title: &str, message: &str) {
        if id <= 0 {
            return;
        }
        self.prompter.progress(id, title, message, 0, 0, true);
    }

    fn await_prompt(&self, request: UiRequest) -> PromptResult {
        let (tx, rx) = mpsc::channel();
        self.prompter.prompt(request, tx);
        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => {
                log::warn!("[UI] Prompt unanswered after {:?}, treating as cancelled", self.timeout);
                PromptResult::cancelled()
            }
        }
    }
}

fn coerce_options(raw: Array) -> Vec<String> {
    raw.into_iter()
        .map(|item| item.to_string())
        .collect()
}

/// Build the `ui` rhai module over a shared API handle.
pub fn module(api: Arc<UiApi>) -> Module {
    let mut module = Module::new();

    let handle = api.clone();
    module.set_native_fn("toast", move |message: &str| {
        handle.toast(message);
        Ok(())
    });

    let handle = api.clone();
    module.set_native_fn("menu", move |title: &str, options: Array| {
        Ok(handle.menu(title, coerce_options(options)))
    });

    let handle = api.clone();
    module.set_native_fn("menu_multi", move |title: &str, options: Array| {
        Ok(handle
            .menu_multi(title, coerce_options(options))
            .into_iter()
            .map(Dynamic::from)
            .collect::<Array>())
    });

    let handle = api.clone();
    module.set_native_fn("pick_date", move |title: &str, initial_ms: i64| {
        Ok(handle.pick_date(title, initial_ms))
    });

    let handle = api.clone();
    module.set_native_fn("progress_start", move |title: &str, message: &str, total: i64| {
        Ok(handle.progress_start(title, message, total))
    });

    let handle = api.clone();
    module.set_native_fn(
        "progress_update",
        move |id: i64, title: &str, message: &str, current: i64, total: i64| {
            handle.progress_update(id, title, message, current, total);
            Ok(())
        },
    );

    let handle = api;
    module.set_native_fn("progress_finish", move |id: i64, title: &str, message: &str| {
        handle.progress_finish(id, title, message);
        Ok(())
    });

    module
}
