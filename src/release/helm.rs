// src/release/helm.rs

//! Helm CLI client.
//!
//! Drives the `helm` command-line tool: upgrade, delete, history and
//! values queries. The wait for each invocation runs on the blocking
//! thread pool and races the cancellation token; a helm process in
//! flight at shutdown is sent SIGTERM and its result discarded. Output
//! parsing is isolated in free functions so it can be tested without a
//! helm binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::values::Values;

use super::{PackageManager, ReleaseState, ReleaseStatus};

/// Helm binary name; resolved through PATH
const HELM_PATH: &str = "helm";

pub struct HelmCli {
    namespace: String,
}

impl HelmCli {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into() }
    }

    /// Run helm to completion under the cancellation token; the exit
    /// status is the caller's concern
    async fn helm_output(
        &self,
        args: &[&str],
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Output> {
        debug!("helm {}", args.join(" "));
        if *cancel.borrow() {
            return Err(Error::Cancelled);
        }

        let mut child = Command::new(HELM_PATH)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::PackageManager(format!("failed to run helm: {}. Is helm installed?", e))
            })?;
        let pid = child.id();

        let wait = tokio::task::spawn_blocking(move || child.wait_with_output());

        tokio::select! {
            joined = wait => joined
                .map_err(|e| Error::PackageManager(format!("helm wait task failed: {}", e)))?
                .map_err(|e| Error::PackageManager(format!("cannot collect helm output: {}", e))),
            _ = cancel_fired(&mut cancel) => {
                debug!("cancelling helm invocation on shutdown");
                terminate(pid);
                Err(Error::Cancelled)
            }
        }
    }

    /// Run helm and require success; returns trimmed stdout/stderr
    async fn helm(
        &self,
        args: &[&str],
        cancel: watch::Receiver<bool>,
    ) -> Result<(String, String)> {
        let output = self.helm_output(args, cancel).await?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            return Err(Error::PackageManager(format!(
                "helm {} exited with {}: {}",
                args.first().unwrap_or(&""),
                output.status.code().unwrap_or(-1),
                if stderr.is_empty() { &stdout } else { &stderr }
            )));
        }
        Ok((stdout, stderr))
    }
}

#[async_trait]
impl PackageManager for HelmCli {
    async fn list_release_names(&self, cancel: watch::Receiver<bool>) -> Result<Vec<String>> {
        let (stdout, _) = self.helm(&["list", "--short"], cancel).await?;
        Ok(stdout
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    async fn last_release_status(
        &self,
        release: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<ReleaseStatus> {
        let output = self
            .helm_output(&["history", release, "--max", "1"], cancel)
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            // "release: not found" is a normal answer, not an error
            let first_line = stderr.lines().next().unwrap_or("");
            if first_line.contains("not found") {
                debug!("release '{}' has no history", release);
                return Ok(ReleaseStatus::absent());
            }
            return Err(Error::PackageManager(format!(
                "cannot get history for release '{}': {}",
                release,
                stderr.trim()
            )));
        }

        parse_last_history_line(&stdout).ok_or_else(|| {
            Error::PackageManager(format!(
                "unexpected helm history output for release '{}'",
                release
            ))
        })
    }

    async fn upgrade_release(
        &self,
        release: &str,
        chart: &Path,
        value_files: &[PathBuf],
        set_args: &[String],
        namespace: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        let chart = chart.to_string_lossy();
        let mut args: Vec<&str> = vec!["upgrade", "--install", release, &chart];

        let namespace = if namespace.is_empty() { self.namespace.as_str() } else { namespace };
        if !namespace.is_empty() {
            args.push("--namespace");
            args.push(namespace);
        }

        let file_args: Vec<String> =
            value_files.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        for file in &file_args {
            args.push("--values");
            args.push(file);
        }
        for set in set_args {
            args.push("--set");
            args.push(set);
        }

        info!(
            "upgrading release '{}' with chart '{}' in namespace '{}'",
            release, chart, namespace
        );
        let (stdout, _) = self.helm(&args, cancel).await?;
        debug!("helm upgrade for release '{}' done: {}", release, stdout);
        Ok(())
    }

    async fn delete_release(&self, release: &str, cancel: watch::Receiver<bool>) -> Result<()> {
        info!("deleting release '{}'", release);
        self.helm(&["delete", "--purge", release], cancel).await?;
        Ok(())
    }

    async fn get_release_values(
        &self,
        release: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<Values> {
        let (stdout, _) = self
            .helm(&["get", "values", release, "--output", "json"], cancel)
            .await?;
        if stdout.is_empty() || stdout == "null" {
            return Ok(Values::new());
        }
        Values::from_json_slice(stdout.as_bytes())
            .map_err(|e| Error::PackageManager(format!("cannot parse values of release '{}': {}", release, e)))
    }

    async fn list_failed_revision_records(
        &self,
        release: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<Vec<String>> {
        let (stdout, _) = self.helm(&["history", release], cancel).await?;
        Ok(parse_failed_records(&stdout, release))
    }

    async fn delete_revision_record(
        &self,
        record: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        // Revision records are stored as cluster objects owned by the
        // package manager; removal goes through its storage plugin.
        self.helm(&["storage", "delete", record], cancel).await?;
        Ok(())
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

/// Best-effort SIGTERM to an in-flight helm process
fn terminate(pid: u32) {
    let _ = nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGTERM,
    );
}

/// Parse the last line of `helm history` output into a release status.
///
/// ```text
/// REVISION  UPDATED                   STATUS      CHART           DESCRIPTION
/// 3         Fri Jul 14 18:25:00 2017  SUPERSEDED  ingress-0.1.0   Install complete
/// ```
fn parse_last_history_line(stdout: &str) -> Option<ReleaseStatus> {
    let line = stdout.lines().filter(|l| !l.trim().is_empty()).last()?;
    let (revision, status) = parse_history_fields(line)?;
    Some(ReleaseStatus { revision, status: ReleaseState::parse(&status) })
}

/// Record names of FAILED revisions in full `helm history` output
fn parse_failed_records(stdout: &str, release: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .filter_map(parse_history_fields)
        .filter(|(_, status)| status.eq_ignore_ascii_case("FAILED"))
        .map(|(revision, _)| format!("{}.v{}", release, revision))
        .collect()
}

/// Extract (revision, status) from a history line. Columns are separated
/// by tabs or runs of two-plus spaces; the UPDATED column contains single
/// spaces itself.
fn parse_history_fields(line: &str) -> Option<(u64, String)> {
    let fields: Vec<&str> = if line.contains('\t') {
        line.split('\t').map(str::trim).filter(|f| !f.is_empty()).collect()
    } else {
        split_on_wide_gaps(line)
    };
    if fields.len() < 3 {
        return None;
    }
    let revision = fields[0].parse::<u64>().ok()?;
    Some((revision, fields[2].to_string()))
}

fn split_on_wide_gaps(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut rest = line.trim();
    while !rest.is_empty() {
        let end = rest.find("  ").unwrap_or(rest.len());
        fields.push(rest[..end].trim());
        rest = rest[end..].trim_start();
    }
    fields
}
