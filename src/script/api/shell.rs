//! Shell capability — unprivileged and privileged command execution
//! for scripts, returning exit code plus captured output.
//!
//! Runs synchronously: the script worker is the only thread blocked.

use std::process::Command;
use std::sync::Arc;

use rhai::{Dynamic, EvalAltResult, Module};

#[derive(Debug, Clone)]
pub struct ShellResult {
    pub code: i64,
    pub stdout: String,
    pub stderr: String,
}

pub struct ShellApi {
    privileged_shell: String,
}

impl ShellApi {
    pub fn new(privileged_shell: impl Into<String>) -> Self {
        Self {
            privileged_shell: privileged_shell.into(),
        }
    }

    /// Run through the plain user shell.
    pub fn exec(&self, command: &str) -> std::io::Result<ShellResult> {
        run("sh", command)
    }

    /// Run through the privileged shell (same broker the capture
    /// channel uses).
    pub fn sudo(&self, command: &str) -> std::io::Result<ShellResult> {
        run(&self.privileged_shell, command)
    }
}

fn run(shell: &str, command: &str) -> std::io::Result<ShellResult> {
    let output = Command::new(shell).arg("-c").arg(command).output()?;
    Ok(ShellResult {
        code: output.status.code().unwrap_or(-1) as i64,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

fn to_map(result: ShellResult) -> rhai::Map {
    let mut map = rhai::Map::new();
    map.insert("code".into(), Dynamic::from(result.code));
    map.insert("stdout".into(), Dynamic::from(result.stdout));
    map.insert("stderr".into(), Dynamic::from(result.stderr));
    map
}

/// Build the `shell` rhai module over a shared API handle.
pub fn module(api: Arc<ShellApi>) -> Module {
    let mut module = Module::new();

    let handle = api.clone();
    module.set_native_fn("exec", move |command: &str| {
        handle
            .exec(command)
            .map(to_map)
            .map_err(|e| -> Box<EvalAltResult> { format!("shell::exec: {}", e).into() })
    });

    let handle = api;
    module.set_native_fn("sudo", move |command: &str| {
        handle
            .sudo(command)
            .map(to_map)
            .map_err(|e| -> Box<EvalAltResult> { format!("shell::sudo: {}", e).into() })
    });

    module
}
