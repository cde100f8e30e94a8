use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::release::{replaceable_asset, BuildIdentity, InstallerRelease};
use crate::core::downloader::{sha256_file, Downloader};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::github::GithubRelease;
use crate::core::platform::HostOs;

const STAGING_PREFIX: &str = ".VencordInstaller.";
const STAGING_SUFFIX: &str = ".download";

#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn fetch_latest(&self) -> InstallerResult<GithubRelease>;
    async fn download(&self, url: &str, dest: &Path) -> InstallerResult<()>;
}

pub struct GithubReleaseSource {
    downloader: Downloader,
    endpoint: String,
}

impl GithubReleaseSource {
    pub fn new(downloader: Downloader, endpoint: String) -> Self {
        Self {
            downloader,
            endpoint,
        }
    }
}

#[async_trait]
impl ReleaseSource for GithubReleaseSource {
    async fn fetch_latest(&self) -> InstallerResult<GithubRelease> {
        GithubRelease::fetch_first(self.downloader.client(), std::slice::from_ref(&self.endpoint))
            .await
    }

    async fn download(&self, url: &str, dest: &Path) -> InstallerResult<()> {
        self.downloader.download_file(url, dest, None).await?;
        Ok(())
    }
}

/// Result of the startup release check.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseStatus {
    pub latest: InstallerRelease,
    pub is_outdated: bool,
}

/// Binary that gets replaced by an update.
#[derive(Debug, Clone)]
pub enum UpdateTarget {
    /// The executable of this process.
    Running,
    /// A plain file, replaced by rename.
    File(PathBuf),
}

#[derive(Debug)]
pub enum UpdateOutcome {
    /// The binary was swapped; relaunch to run the new version.
    Replaced(PendingRelaunch),
    /// No in-place update here; the release page was opened instead.
    OpenedReleasePage(String),
}

/// Handed out only after a successful swap, so a relaunch can never race
/// the replacement.
#[derive(Debug)]
pub struct PendingRelaunch {
    executable: PathBuf,
}

impl PendingRelaunch {
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Start the new binary with the same arguments and exit this process.
    pub fn relaunch(self) -> InstallerResult<()> {
        info!("Relaunching {:?}", self.executable);
        Command::new(&self.executable)
            .args(std::env::args_os().skip(1))
            .spawn()
            .map_err(|source| InstallerError::Io {
                path: self.executable.clone(),
                source,
            })?;
        std::process::exit(0);
    }
}

pub struct SelfUpdater {
    identity: BuildIdentity,
    os: HostOs,
    arch: String,
    source: Arc<dyn ReleaseSource>,
    target: UpdateTarget,
    open_url: fn(&str) -> io::Result<()>,
    latest: OnceCell<InstallerRelease>,
}

fn open_in_browser(url: &str) -> io::Result<()> {
    open::that(url)
}

impl SelfUpdater {
    pub fn new(identity: BuildIdentity, source: Arc<dyn ReleaseSource>) -> Self {
        Self {
            identity,
            os: HostOs::current(),
            arch: std::env::consts::ARCH.to_string(),
            source,
            target: UpdateTarget::Running,
            open_url: open_in_browser,
            latest: OnceCell::new(),
        }
    }

    pub fn with_platform(mut self, os: HostOs, arch: impl Into<String>) -> Self {
        self.os = os;
        self.arch = arch.into();
        self
    }

    pub fn with_target(mut self, target: UpdateTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_url_opener(mut self, open_url: fn(&str) -> io::Result<()>) -> Self {
        self.open_url = open_url;
        self
    }

    pub fn identity(&self) -> &BuildIdentity {
        &self.identity
    }

    async fn latest(&self) -> InstallerResult<&InstallerRelease> {
        let asset = replaceable_asset(self.os, &self.arch);
        self.latest
            .get_or_try_init(|| async {
                let release = self.source.fetch_latest().await?;
                Ok::<_, InstallerError>(InstallerRelease::from_github(&release, asset))
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn check_for_update(&self) -> InstallerResult<ReleaseStatus> {
        let latest = self.latest().await?.clone();
        let is_outdated = latest.is_newer_than(&self.identity);
        info!(
            "Installer {} ({}), latest {} ({}), outdated={}",
            self.identity.tag, self.identity.commit_hash, latest.tag, latest.commit_hash, is_outdated
        );
        Ok(ReleaseStatus {
            latest,
            is_outdated,
        })
    }

    /// Replace the binary with the latest release, or open the release page
    /// where that is not possible.
    #[instrument(skip(self))]
    pub async fn update(&self) -> InstallerResult<UpdateOutcome> {
        let latest = self.latest().await?.clone();

        let Some(link) = latest.download_link.clone() else {
            info!("No in-place update for {:?}/{}, opening release page", self.os, self.arch);
            (self.open_url)(&latest.html_url).map_err(|e| {
                InstallerError::Other(format!("Failed to open {}: {e}", latest.html_url))
            })?;
            return Ok(UpdateOutcome::OpenedReleasePage(latest.html_url));
        };

        let target = self.target_path()?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| InstallerError::Other(format!("{:?} has no parent", target)))?;
        let staging = dir.join(format!("{STAGING_PREFIX}{}{STAGING_SUFFIX}", Uuid::new_v4()));

        let result = self.stage_and_swap(&link, &latest, &staging, &target).await;
        if staging.exists() {
            let _ = std::fs::remove_file(&staging);
        }
        result?;

        info!("Updated installer to {}", latest.tag);
        Ok(UpdateOutcome::Replaced(PendingRelaunch { executable: target }))
    }

    async fn stage_and_swap(
        &self,
        link: &str,
        latest: &InstallerRelease,
        staging: &Path,
        target: &Path,
    ) -> InstallerResult<()> {
        self.source.download(link, staging).await?;

        if let Some(expected) = &latest.sha256 {
            let actual = sha256_file(staging)?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(InstallerError::IntegrityMismatch {
                    name: link.to_string(),
                    expected: expected.clone(),
                    actual,
                });
            }
        } else {
            warn!("Release publishes no digest for {}, skipping verification", link);
        }

        make_executable(staging)?;

        match &self.target {
            UpdateTarget::Running => self_replace::self_replace(staging).map_err(|source| {
                InstallerError::Io {
                    path: target.to_path_buf(),
                    source,
                }
            }),
            UpdateTarget::File(path) => {
                std::fs::rename(staging, path).map_err(|source| InstallerError::Io {
                    path: path.clone(),
                    source,
                })
            }
        }
    }

    fn target_path(&self) -> InstallerResult<PathBuf> {
        match &self.target {
            UpdateTarget::Running => std::env::current_exe().map_err(|source| InstallerError::Io {
                path: PathBuf::from("<current exe>"),
                source,
            }),
            UpdateTarget::File(path) => Ok(path.clone()),
        }
    }

    /// Remove downloads abandoned by an interrupted update.
    pub fn sweep_leftovers(&self) {
        let Ok(target) = self.target_path() else {
            return;
        };
        let Some(dir) = target.parent() else {
            return;
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.filter_map(Result::ok) {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(STAGING_PREFIX) && name.ends_with(STAGING_SUFFIX) {
                debug!("Removing leftover update download {}", name);
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> InstallerResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|source| {
        InstallerError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> InstallerResult<()> {
    Ok(())
}
