// src/release/mod.rs

//! The package-manager seam.
//!
//! A release is a deployed instance of a module; release name equals
//! module name. The package manager stores one revision record per
//! deployment attempt, named `<release>.v<n>`. The core treats the
//! package manager as a black box behind this trait; the CLI client in
//! [`helm`] is the shipped implementation. Every call takes a
//! cancellation token cloned from the controller's shutdown flag and
//! ends with `Error::Cancelled` when it fires mid-flight.

pub mod helm;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::Result;
use crate::values::Values;

pub use helm::HelmCli;

/// Recognized release states; anything else is carried through opaquely
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseState {
    /// No release exists (or no state could be attributed)
    Unknown,
    Deployed,
    Failed,
    Superseded,
    Other(String),
}

impl ReleaseState {
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "DEPLOYED" => ReleaseState::Deployed,
            "FAILED" => ReleaseState::Failed,
            "SUPERSEDED" => ReleaseState::Superseded,
            "" => ReleaseState::Unknown,
            other => ReleaseState::Other(other.to_string()),
        }
    }
}

/// Last known revision and state of a release.
///
/// A missing release is `revision == 0` with `ReleaseState::Unknown`;
/// errors are reserved for genuine failures to query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseStatus {
    pub revision: u64,
    pub status: ReleaseState,
}

impl ReleaseStatus {
    pub fn absent() -> Self {
        Self { revision: 0, status: ReleaseState::Unknown }
    }

    pub fn exists(&self) -> bool {
        self.revision > 0
    }
}

/// External package manager operations the controller relies on
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Names of all installed releases, without revision suffixes
    async fn list_release_names(&self, cancel: watch::Receiver<bool>) -> Result<Vec<String>>;

    /// Last revision and status of one release
    async fn last_release_status(
        &self,
        release: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<ReleaseStatus>;

    /// Install or upgrade a release from a chart directory
    async fn upgrade_release(
        &self,
        release: &str,
        chart: &std::path::Path,
        value_files: &[PathBuf],
        set_args: &[String],
        namespace: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<()>;

    /// Delete a release and its revision records
    async fn delete_release(&self, release: &str, cancel: watch::Receiver<bool>) -> Result<()>;

    /// Values the release was last deployed with
    async fn get_release_values(
        &self,
        release: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<Values>;

    /// Revision record names (`<release>.v<n>`) of FAILED revisions
    async fn list_failed_revision_records(
        &self,
        release: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<Vec<String>>;

    /// Delete a single revision record
    async fn delete_revision_record(
        &self,
        record: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<()>;

    async fn release_exists(&self, release: &str, cancel: watch::Receiver<bool>) -> Result<bool> {
        Ok(self.last_release_status(release, cancel).await?.exists())
    }

    /// Purge a release whose very first deployment failed. Anything past
    /// revision 1 is left alone: those records are operator evidence.
    async fn delete_single_failed_revision(
        &self,
        release: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        let status = self.last_release_status(release, cancel.clone()).await?;
        if !status.exists() {
            debug!("release '{}' not found, no cleanup required", release);
            return Ok(());
        }
        if status.revision == 1 && status.status == ReleaseState::Failed {
            self.delete_release(release, cancel).await?;
            info!("release '{}': cleaned up failed first revision", release);
        } else {
            debug!(
                "release '{}': revision {} with status {:?}, keeping",
                release, status.revision, status.status
            );
        }
        Ok(())
    }

    /// Delete all FAILED revision records except the newest one
    async fn delete_old_failed_revisions(
        &self,
        release: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        let records = self.list_failed_revision_records(release, cancel.clone()).await?;

        let mut revisions: Vec<u64> = records
            .iter()
            .filter_map(|record| parse_revision_record(record, release))
            .collect();
        revisions.sort_unstable();
        // The newest FAILED record stays as evidence
        revisions.pop();

        for revision in revisions {
            let record = format!("{}.v{}", release, revision);
            info!("release '{}': deleting old failed revision record {}", release, record);
            self.delete_revision_record(&record, cancel.clone()).await?;
        }
        Ok(())
    }
}

/// Parse the revision number out of a `<release>.v<n>` record name
pub fn parse_revision_record(record: &str, release: &str) -> Option<u64> {
    let suffix = record.strip_prefix(release)?.strip_prefix(".v")?;
    suffix.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_state_parse() {
        assert_eq!(ReleaseState::parse("FAILED"), ReleaseState::Failed);
        assert_eq!(ReleaseState::parse("deployed"), ReleaseState::Deployed);
        assert_eq!(ReleaseState::parse("SUPERSEDED"), ReleaseState::Superseded);
        assert_eq!(ReleaseState::parse(""), ReleaseState::Unknown);
        assert_eq!(
            ReleaseState::parse("PENDING_UPGRADE"),
            ReleaseState::Other("PENDING_UPGRADE".to_string())
        );
    }

    #[test]
    fn test_parse_revision_record() {
        assert_eq!(parse_revision_record("ingress.v3", "ingress"), Some(3));
        assert_eq!(parse_revision_record("ingress.v3", "metrics"), None);
        assert_eq!(parse_revision_record("ingress", "ingress"), None);
        // Release names may themselves contain dots and `.v` sequences
        assert_eq!(parse_revision_record("web.v2.v10", "web.v2"), Some(10));
    }

    #[test]
    fn test_absent_status() {
        let status = ReleaseStatus::absent();
        assert!(!status.exists());
        assert_eq!(status.revision, 0);
        assert_eq!(status.status, ReleaseState::Unknown);
    }
}
