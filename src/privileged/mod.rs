//! Privileged shell execution — runs commands through the host's
//! privilege broker (`su -c ...` by default) with bounded waits,
//! a result taxonomy, and a retry loop.
//!
//! The availability cache is deliberately pessimistic: privilege grants
//! expire or get revoked between invocations, so callers force a
//! re-probe immediately before any operation that depends on them.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

/// Default attempt budget for [`PrivilegedExecutor::exec`].
pub const DEFAULT_RETRY_COUNT: u32 = 3;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(300);
// Privilege managers may block on an authorization dialog before the
// command even starts, so the per-attempt budget is generous.
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(8);

const AVAIL_UNKNOWN: u8 = 0;
const AVAIL_NO: u8 = 1;
const AVAIL_YES: u8 = 2;

/// Outcome of one privileged command (single attempt or whole retry run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecResult {
    Success,
    /// The privileged shell binary does not exist. Terminal — retrying
    /// cannot help on an unrooted host.
    BinaryNotFound,
    /// Authorization denied (exit 255) or EACCES (exit 13).
    PermissionDenied,
    /// The attempt exceeded its time budget and the process was killed.
    Timeout,
    /// Nonzero exit code other than the permission codes.
    CommandFailed,
    /// The wait was torn down mid-flight. Terminal.
    Interrupted,
}

impl ExecResult {
    pub fn is_success(self) -> bool {
        self == ExecResult::Success
    }

    /// Terminal results short-circuit the retry loop.
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecResult::BinaryNotFound | ExecResult::Interrupted)
    }

    pub fn describe(self) -> &'static str {
        match self {
            ExecResult::Success => "command executed successfully",
            ExecResult::BinaryNotFound => "privileged shell binary not found — host may not be rooted",
            ExecResult::PermissionDenied => "privilege authorization denied",
            ExecResult::Timeout => "command timed out — privilege broker may be unresponsive",
            ExecResult::CommandFailed => "command returned a nonzero exit code",
            ExecResult::Interrupted => "command was interrupted",
        }
    }
}

/// Executes commands through the privileged shell and caches whether the
/// privileged channel is usable at all.
///
/// One instance lives for the whole process (constructed in `main`);
/// the cache is a field here, not a global.
pub struct PrivilegedExecutor {
    shell: String,
    attempt_timeout: Duration,
    retry_delay: Duration,
    availability: AtomicU8,
}

impl Default for PrivilegedExecutor {
    fn default() -> Self {
        Self::with_shell("su")
    }
}

impl PrivilegedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            availability: AtomicU8::new(AVAIL_UNKNOWN),
        }
    }

    /// Override the per-attempt time budget.
    pub fn attempt_timeout(mut self, budget: Duration) -> Self {
        self.attempt_timeout = budget;
        self
    }

    /// Override the fixed delay between retry attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Name of the privileged shell binary (`su` unless overridden).
    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Drop the cached availability verdict so the next check re-probes.
    pub fn clear_cache(&self) {
        let old = self.availability.swap(AVAIL_UNKNOWN, Ordering::SeqCst);
        log::debug!("[EXEC] Availability cache cleared (was {})", describe_cache(old));
    }

    /// Is the privileged channel usable? Probes with a no-op command and
    /// caches the verdict. `force_recheck` bypasses the cache — callers
    /// must pass `true` right before privilege-sensitive operations,
    /// since a cached "yes" can go stale across suspension or revocation.
    pub async fn is_available(&self, force_recheck: bool) -> bool {
        if force_recheck {
            self.clear_cache();
        }
        match self.availability.load(Ordering::SeqCst) {
            AVAIL_YES => return true,
            AVAIL_NO => return false,
            _ => {}
        }
        log::info!("[EXEC] Probing privileged channel via '{} -c exit'", self.shell);
        let result = self.execute("exit", 1).await;
        let available = result.is_success();
        self.availability.store(
            if available { AVAIL_YES } else { AVAIL_NO },
            Ordering::SeqCst,
        );
        log::info!("[EXEC] Probe result: {:?}, available={}", result, available);
        available
    }

    /// Run `command` with the default retry budget.
    pub async fn exec(&self, command: &str) -> ExecResult {
        self.execute(command, DEFAULT_RETRY_COUNT).await
    }

    /// Run `command` through the privileged shell with up to `max_retries`
    /// attempts. Stops early on success or a terminal result. The
    /// availability cache is invalidated before each retry so the broker
    /// re-authorizes rather than replaying a stale denial.
    pub async fn execute(&self, command: &str, max_retries: u32) -> ExecResult {
        let max_retries = max_retries.max(1);
        log::info!("[EXEC] '{}' (max {} attempts)", command, max_retries);

        let mut last = ExecResult::CommandFailed;
        for attempt in 1..=max_retries {
            let started = std::time::Instant::now();
            last = self.exec_once(command).await;
            log::info!(
                "[EXEC] Attempt {}/{}: {:?} in {}ms",
                attempt,
                max_retries,
                last,
                started.elapsed().as_millis()
            );

            if last.is_success() {
                return last;
            }
            if last.is_terminal() {
                log::warn!("[EXEC] Terminal result {:?}, aborting retries", last);
                return last;
            }
            if attempt < max_retries {
                tokio::time::sleep(self.retry_delay).await;
                self.clear_cache();
            }
        }
        log::error!("[EXEC] Failed after {} attempts: {:?}", max_retries, last);
        last
    }

    async fn exec_once(&self, command: &str) -> ExecResult {
        // Fast path: a missing shell binary is not worth a spawn attempt.
        if which::which(&self.shell).is_err() {
            log::error!("[EXEC] '{}' not found in PATH", self.shell);
            return ExecResult::BinaryNotFound;
        }

        let mut child = match Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::error!("[EXEC] Spawn failed, '{}' missing: {}", self.shell, e);
                return ExecResult::BinaryNotFound;
            }
            Err(e) => {
                log::error!("[EXEC] Spawn failed: {}", e);
                return ExecResult::CommandFailed;
            }
        };

        let status = match timeout(self.attempt_timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                log::error!("[EXEC] Wait failed: {}", e);
                return ExecResult::CommandFailed;
            }
            Err(_) => {
                log::error!(
                    "[EXEC] Timeout after {:?} waiting for '{}'",
                    self.attempt_timeout,
                    command
                );
                let _ = child.kill().await;
                return ExecResult::Timeout;
            }
        };

        match status.code() {
            Some(0) => ExecResult::Success,
            // 255: broker denied authorization. 13: EACCES.
            Some(255) | Some(13) => {
                log::warn!("[EXEC] Permission denied (exit {:?})", status.code());
                ExecResult::PermissionDenied
            }
            Some(code) => {
                log::warn!("[EXEC] Exit {}: {}", code, describe_exit_code(code));
                ExecResult::CommandFailed
            }
            // Killed by a signal — the wait was torn down under us.
            None => ExecResult::Interrupted,
        }
    }
}

fn describe_cache(state: u8) -> &'static str {
    match state {
        AVAIL_YES => "yes",
        AVAIL_NO => "no",
        _ => "unknown",
    }
}

fn describe_exit_code(code: i32) -> &'static str {
    match code {
        1 => "general error or command returned false",
        126 => "command not executable",
        127 => "command not found",
        _ => "unknown exit code",
    }
}
