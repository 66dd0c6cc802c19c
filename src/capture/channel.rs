//! Channel selection — picks one capture action from the configured
//! preference and a live availability snapshot taken at preflight.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::AssistiveService;
use crate::privileged::{ExecResult, PrivilegedExecutor};

const CAPTURE_RETRY_COUNT: u32 = 3;

/// Availability read once at preflight; the selector never probes itself.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSnapshot {
    pub privileged: bool,
    pub assistive: bool,
}

/// Privileged capture: issues the OS screenshot command through the
/// executor and retains the last result for diagnostic mapping.
pub struct PrivilegedCapture {
    executor: Arc<PrivilegedExecutor>,
    command: String,
    last_result: Mutex<Option<ExecResult>>,
}

impl PrivilegedCapture {
    pub fn new(executor: Arc<PrivilegedExecutor>, command: impl Into<String>) -> Self {
        Self {
            executor,
            command: command.into(),
            last_result: Mutex::new(None),
        }
    }

    pub async fn capture(&self) -> bool {
        log::info!("[CHANNEL] Dispatching privileged capture: '{}'", self.command);
        let result = self.executor.execute(&self.command, CAPTURE_RETRY_COUNT).await;
        if !result.is_success() {
            log::error!("[CHANNEL] Privileged capture failed: {}", result.describe());
        }
        *self.last_result.lock().await = Some(result);
        result.is_success()
    }

    /// Result of the most recent dispatch, for failure-reason mapping.
    pub async fn last_result(&self) -> ExecResult {
        self.last_result
            .lock()
            .await
            .unwrap_or(ExecResult::CommandFailed)
    }
}

/// The closed set of capture strategies.
pub enum CaptureAction {
    Privileged(PrivilegedCapture),
    Assistive(Arc<dyn AssistiveService>),
    /// No working channel existed at selection time. Capturing through
    /// this is a fatal precondition failure, not a retryable error.
    Unavailable,
}

impl CaptureAction {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureAction::Privileged(_) => "privileged",
            CaptureAction::Assistive(_) => "assistive",
            CaptureAction::Unavailable => "unavailable",
        }
    }

    /// Dispatch the capture. The artifact (if any) materializes in the
    /// media index; this only reports whether dispatch succeeded.
    pub async fn capture(&self) -> bool {
        match self {
            CaptureAction::Privileged(action) => action.capture().await,
            CaptureAction::Assistive(service) => {
                let service = service.clone();
                // The service handle may block on the compositor; keep it
                // off the coordination task.
                tokio::task::spawn_blocking(move || service.request_screenshot())
                    .await
                    .unwrap_or(false)
            }
            CaptureAction::Unavailable => {
                log::error!("[CHANNEL] Capture requested with no working channel");
                false
            }
        }
    }

    /// The retained privileged result, when this is the privileged action.
    pub async fn last_privileged_result(&self) -> Option<ExecResult> {
        match self {
            CaptureAction::Privileged(action) => Some(action.last_result().await),
            _ => None,
        }
    }
}

/// Pick the capture action. The configured preference wins whenever its
/// channel is available; the alternate is only a fallback for
/// unavailability, never for a single failed invocation.
pub fn select_action(
    prefer_privileged: bool,
    snapshot: ChannelSnapshot,
    executor: Arc<PrivilegedExecutor>,
    assistive: Arc<dyn AssistiveService>,
    capture_command: &str,
) -> CaptureAction {
    log::info!(
        "[CHANNEL] Selecting action: prefer_privileged={} privileged={} assistive={}",
        prefer_privileged,
        snapshot.privileged,
        snapshot.assistive
    );

    if prefer_privileged && snapshot.privileged {
        log::info!("[CHANNEL] Selected privileged capture");
        return CaptureAction::Privileged(PrivilegedCapture::new(executor, capture_command));
    }
    if snapshot.assistive {
        log::info!("[CHANNEL] Selected assistive capture");
        return CaptureAction::Assistive(assistive);
    }

    log::error!("[CHANNEL] No capture channel available");
    CaptureAction::Unavailable
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeAssistive {
        connected: bool,
    }

    impl AssistiveService for FakeAssistive {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn request_screenshot(&self) -> bool {
            self.connected
        }
    }

    fn executor() -> Arc<PrivilegedExecutor> {
        Arc::new(PrivilegedExecutor::with_shell("sh"))
    }

    fn assistive(connected: bool) -> Arc<dyn AssistiveService> {
        Arc::new(FakeAssistive { connected })
    }

    #[test]
    fn preference_wins_when_both_available() {
        let action = select_action(
            true,
            ChannelSnapshot {
                privileged: true,
                assistive: true,
            },
            executor(),
            assistive(true),
            "true",
        );
        assert_eq!(action.name(), "privileged");
    }

    #[test]
    fn assistive_preferred_skips_privileged() {
        let action = select_action(
            false,
            ChannelSnapshot {
                privileged: true,
                assistive: true,
            },
            executor(),
            assistive(true),
            "true",
        );
        assert_eq!(action.name(), "assistive");
    }

    #[test]
    fn falls_back_to_assistive_when_privileged_unavailable() {
        let action = select_action(
            true,
            ChannelSnapshot {
                privileged: false,
                assistive: true,
            },
            executor(),
            assistive(true),
            "true",
        );
        assert_eq!(action.name(), "assistive");
    }

    #[tokio::test]
    async fn no_channel_yields_failing_action() {
        let action = select_action(
            true,
            ChannelSnapshot {
                privileged: false,
                assistive: false,
            },
            executor(),
            assistive(false),
            "true",
        );
        assert_eq!(action.name(), "unavailable");
        assert!(!action.capture().await);
    }

    #[tokio::test]
    async fn privileged_action_retains_last_result() {
        let action = CaptureAction::Privileged(PrivilegedCapture::new(executor(), "exit 255"));
        assert!(!action.capture().await);
        assert_eq!(
            action.last_privileged_result().await,
            Some(ExecResult::PermissionDenied)
        );
    }
}
