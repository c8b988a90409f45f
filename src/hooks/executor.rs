// src/hooks/executor.rs

//! Hook execution against the local shell.
//!
//! The executor stages hook input as JSON files in a temp directory and
//! points the hook at them through environment variables:
//!
//! - `VALUES_PATH`: merged values snapshot for the hook's scope
//! - `BINDING_CONTEXT_PATH`: array of binding contexts for this firing
//! - `VALUES_JSON_PATCH_PATH`: where the hook writes values patches
//! - `ENABLED_MODULES_PATH` / `ENABLED_RESULT_PATH`: enable-probe input
//!   and verdict file
//!
//! Hooks run with stdin nulled and a hard timeout; stdout and stderr are
//! re-logged line by line. The wait happens on the blocking thread pool,
//! racing the caller's cancellation token: on shutdown the child is sent
//! SIGTERM and the run ends with `Error::Cancelled`, its result
//! discarded.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use crate::error::{Error, Result};
use crate::values::{Values, ValuesPatch};

use super::{Binding, BindingContext, HookConfigSpec};

/// Default timeout for hook execution
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for `--config` self-configuration runs
const CONFIG_TIMEOUT: Duration = Duration::from_secs(30);

/// Input for one hook run
#[derive(Debug, Clone)]
pub struct HookRequest {
    pub hook_name: String,
    pub hook_path: PathBuf,
    pub working_dir: PathBuf,
    pub binding: Binding,
    pub contexts: Vec<BindingContext>,
    pub values: Values,
    pub labels: BTreeMap<String, String>,
}

/// What a hook produced
#[derive(Debug, Clone, Default)]
pub struct HookOutput {
    pub patch: ValuesPatch,
}

/// Input for one enable-probe run
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub module: String,
    pub script: PathBuf,
    pub working_dir: PathBuf,
    /// Modules already accepted ahead of this candidate, in catalog order
    pub enabled: Vec<String>,
    pub values: Values,
}

/// The hook execution framework: process spawn, self-configuration and
/// enable probes. The core consumes this interface; scheduling and
/// cluster-event subscription live behind it as well. Every call takes a
/// cancellation token cloned from the controller's shutdown flag.
#[async_trait]
pub trait HookExecutor: Send + Sync {
    /// Run the hook with `--config` and parse its binding declaration
    async fn hook_config(&self, path: &Path, cancel: watch::Receiver<bool>)
        -> Result<HookConfigSpec>;

    /// Run a hook at a binding with prepared values and contexts
    async fn run_hook(&self, req: &HookRequest, cancel: watch::Receiver<bool>)
        -> Result<HookOutput>;

    /// Run a module's enable probe; `Ok(true)` accepts the module
    async fn run_enabled_probe(&self, req: &ProbeRequest, cancel: watch::Receiver<bool>)
        -> Result<bool>;
}

/// Executes hooks as child processes of this operator
pub struct ShellHookExecutor {
    timeout: Duration,
}

impl ShellHookExecutor {
    pub fn new() -> Self {
        Self { timeout: DEFAULT_TIMEOUT }
    }

    /// Set a custom hook timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spawn the command and wait for it on the blocking pool, racing the
    /// cancellation token. On cancellation the child is signaled and the
    /// pending result discarded.
    async fn run_command(
        &self,
        label: &str,
        mut cmd: Command,
        timeout: Duration,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Output> {
        if *cancel.borrow() {
            return Err(Error::Cancelled);
        }

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::HookFailed {
                hook: label.to_string(),
                reason: format!("failed to spawn: {}", e),
            })?;
        let pid = child.id();

        let hook = label.to_string();
        let wait = tokio::task::spawn_blocking(move || -> Result<Output> {
            match child.wait_timeout(timeout)? {
                Some(_status) => Ok(child.wait_with_output()?),
                None => {
                    let _ = child.kill();
                    Err(Error::HookFailed {
                        hook,
                        reason: format!("timed out after {} seconds", timeout.as_secs()),
                    })
                }
            }
        });

        tokio::select! {
            joined = wait => {
                let output = joined.map_err(|e| Error::HookFailed {
                    hook: label.to_string(),
                    reason: format!("wait task failed: {}", e),
                })??;
                relog_output(label, &output);
                Ok(output)
            }
            _ = cancel_fired(&mut cancel) => {
                debug!("cancelling hook '{}' on shutdown", label);
                terminate(pid);
                Err(Error::Cancelled)
            }
        }
    }
}

impl Default for ShellHookExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HookExecutor for ShellHookExecutor {
    async fn hook_config(
        &self,
        path: &Path,
        cancel: watch::Receiver<bool>,
    ) -> Result<HookConfigSpec> {
        let label = path.to_string_lossy().into_owned();
        debug!("reading hook config from {} --config", label);

        let mut cmd = Command::new(path);
        cmd.arg("--config");
        if let Some(parent) = path.parent() {
            cmd.current_dir(parent);
        }
        let output = self.run_command(&label, cmd, CONFIG_TIMEOUT, cancel).await?;

        if !output.status.success() {
            return Err(Error::HookFailed {
                hook: label,
                reason: format!(
                    "--config exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        HookConfigSpec::parse(&output.stdout)
    }

    async fn run_hook(
        &self,
        req: &HookRequest,
        cancel: watch::Receiver<bool>,
    ) -> Result<HookOutput> {
        info!(
            hook = %req.hook_name,
            binding = %req.binding,
            "running hook"
        );
        for (key, value) in &req.labels {
            debug!("hook label {}={}", key, value);
        }

        let staging = TempDir::new()?;
        let values_path = staging.path().join("values.json");
        let context_path = staging.path().join("binding_context.json");
        let patch_path = staging.path().join("values_patch.json");

        fs::write(&values_path, serde_json::to_vec(&req.values.as_value())?)?;
        fs::write(&context_path, serde_json::to_vec(&req.contexts)?)?;

        let mut cmd = Command::new(&req.hook_path);
        cmd.current_dir(&req.working_dir)
            .env("VALUES_PATH", &values_path)
            .env("BINDING_CONTEXT_PATH", &context_path)
            .env("VALUES_JSON_PATCH_PATH", &patch_path);

        let output = self.run_command(&req.hook_name, cmd, self.timeout, cancel).await?;
        if !output.status.success() {
            return Err(Error::HookFailed {
                hook: req.hook_name.clone(),
                reason: format!(
                    "exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let patch = if patch_path.is_file() {
            ValuesPatch::from_hook_output(&fs::read(&patch_path)?)?
        } else {
            ValuesPatch::default()
        };
        Ok(HookOutput { patch })
    }

    async fn run_enabled_probe(
        &self,
        req: &ProbeRequest,
        cancel: watch::Receiver<bool>,
    ) -> Result<bool> {
        debug!(module = %req.module, "running enable probe");

        let staging = TempDir::new().map_err(|e| probe_error(&req.module, &e))?;
        let enabled_path = staging.path().join("enabled_modules.json");
        let values_path = staging.path().join("values.json");
        let result_path = staging.path().join("enabled_result");

        fs::write(&enabled_path, serde_json::to_vec(&req.enabled).map_err(|e| probe_error(&req.module, &e))?)
            .map_err(|e| probe_error(&req.module, &e))?;
        fs::write(&values_path, serde_json::to_vec(&req.values.as_value()).map_err(|e| probe_error(&req.module, &e))?)
            .map_err(|e| probe_error(&req.module, &e))?;

        let mut cmd = Command::new(&req.script);
        cmd.current_dir(&req.working_dir)
            .env("ENABLED_MODULES_PATH", &enabled_path)
            .env("VALUES_PATH", &values_path)
            .env("ENABLED_RESULT_PATH", &result_path);

        let label = format!("{}/enabled", req.module);
        let output = match self.run_command(&label, cmd, self.timeout, cancel).await {
            Ok(output) => output,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                return Err(Error::Enablement {
                    module: req.module.clone(),
                    reason: e.to_string(),
                })
            }
        };

        if !output.status.success() {
            return Err(Error::Enablement {
                module: req.module.clone(),
                reason: format!(
                    "probe exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let verdict = fs::read_to_string(&result_path).map_err(|_| Error::Enablement {
            module: req.module.clone(),
            reason: "probe wrote no verdict file".to_string(),
        })?;
        match verdict.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(Error::Enablement {
                module: req.module.clone(),
                reason: format!("probe verdict must be 'true' or 'false', got '{}'", other),
            }),
        }
    }
}

/// Resolve when the cancellation token fires. A dropped sender means
/// cancellation can no longer happen; pend forever in that case.
async fn cancel_fired(cancel: &mut watch::Receiver<bool>) {
    if *cancel.borrow() {
        return;
    }
    while cancel.changed().await.is_ok() {
        if *cancel.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// Best-effort SIGTERM to an in-flight child
fn terminate(pid: u32) {
    let _ = nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGTERM,
    );
}

fn probe_error(module: &str, err: &dyn std::fmt::Display) -> Error {
    Error::Enablement { module: module.to_string(), reason: err.to_string() }
}

fn relog_output(label: &str, output: &Output) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        info!("[{}] {}", label, line);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        warn!("[{}] {}", label, line);
    }
}
