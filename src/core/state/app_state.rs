use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::session::SessionState;
use super::settings::InstallerSettings;
use crate::core::build::{BuildManifest, BuildProvisioner, BuildStatus, GithubBuildSource};
use crate::core::downloader::Downloader;
use crate::core::error::InstallerResult;
use crate::core::http::build_http_client;
use crate::core::install::{Install, InstallChoice, InstallLocator};
use crate::core::patch::{OpenAsarArchive, PatchEngine, ScuffedDetector, UnpatchOutcome};
use crate::core::platform::{HostEnv, PlatformPaths};
use crate::core::update::{BuildIdentity, GithubReleaseSource, ReleaseStatus, SelfUpdater};

/// Receivers for the two background checks started at launch.
///
/// Each delivers exactly one result; a front end awaits them to re-render.
pub struct StartupChecks {
    pub manifest_check: oneshot::Receiver<InstallerResult<BuildManifest>>,
    pub release_check: oneshot::Receiver<InstallerResult<ReleaseStatus>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenAsarToggle {
    Installed,
    Uninstalled(UnpatchOutcome),
}

/// Everything one installer run owns.
pub struct InstallerState {
    pub env: HostEnv,
    pub paths: PlatformPaths,
    pub settings: InstallerSettings,
    pub downloader: Downloader,
    pub locator: InstallLocator,
    pub provisioner: Arc<BuildProvisioner>,
    pub updater: Arc<SelfUpdater>,
    pub engine: PatchEngine,
    pub installs: Vec<Install>,
    pub session: SessionState,
}

impl InstallerState {
    pub fn from_host() -> InstallerResult<Self> {
        Self::new(HostEnv::current())
    }

    /// Fails only when the cache directory cannot be prepared.
    pub fn new(env: HostEnv) -> InstallerResult<Self> {
        let paths = PlatformPaths::resolve(&env)?;
        let settings = InstallerSettings::load(paths.base_dir());

        let client = build_http_client(settings.http_timeout())?;
        let downloader = Downloader::new(client);

        let build_source = GithubBuildSource::new(downloader.clone(), settings.build_endpoints.clone());
        let provisioner = Arc::new(BuildProvisioner::new(
            paths.files_dir().to_path_buf(),
            paths.is_dev_install(),
            Arc::new(build_source),
        ));

        let release_source = GithubReleaseSource::new(
            downloader.clone(),
            settings.installer_release_endpoint.clone(),
        );
        let updater = Arc::new(SelfUpdater::new(
            BuildIdentity::embedded(),
            Arc::new(release_source),
        ));

        let engine = PatchEngine::new(ScuffedDetector::for_host(&env));
        let locator = InstallLocator::from_paths(env.os, &paths);
        let installs = locator.find();
        let session = SessionState::new(installs.len());

        info!(
            "Installer {} ready, {} install(s) found",
            updater.identity().tag,
            installs.len()
        );

        Ok(Self {
            env,
            paths,
            settings,
            downloader,
            locator,
            provisioner,
            updater,
            engine,
            installs,
            session,
        })
    }

    /// Start the manifest and release checks. Must be called inside a Tokio runtime.
    pub fn spawn_startup_checks(&self) -> StartupChecks {
        let (manifest_tx, manifest_rx) = oneshot::channel();
        let provisioner = self.provisioner.clone();
        tokio::spawn(async move {
            provisioner.sweep_stale_staging();
            let result = provisioner.check().await;
            if let Err(e) = &result {
                warn!("Build manifest check failed: {}", e);
            }
            let _ = manifest_tx.send(result);
        });

        let (release_tx, release_rx) = oneshot::channel();
        let updater = self.updater.clone();
        tokio::spawn(async move {
            updater.sweep_leftovers();
            let result = updater.check_for_update().await;
            if let Err(e) = &result {
                warn!("Installer release check failed: {}", e);
            }
            let _ = release_tx.send(result);
        });

        StartupChecks {
            manifest_check: manifest_rx,
            release_check: release_rx,
        }
    }

    pub fn build_status(&self, check: &InstallerResult<BuildManifest>) -> BuildStatus {
        self.provisioner.status(check)
    }

    pub fn rescan(&mut self) {
        self.installs = self.locator.find();
        self.session.set_install_count(self.installs.len());
    }

    /// Run `op` on the selected install. Custom paths are validated first and
    /// surface `InvalidLocation` when they fail.
    fn with_selected<T>(
        &mut self,
        op: impl FnOnce(&PatchEngine, &mut Install) -> InstallerResult<T>,
    ) -> InstallerResult<T> {
        let index = self.session.selected();
        if index < self.installs.len() {
            return op(&self.engine, &mut self.installs[index]);
        }
        let choice = InstallChoice::PendingCustomPath(self.session.custom_path().to_string());
        let mut install = self.locator.resolve_choice(choice)?;
        op(&self.engine, &mut install)
    }

    /// Bring the cache up to date, then patch the selected install.
    pub async fn patch_selected(&mut self) -> InstallerResult<()> {
        self.engine.scuffed_check()?;
        let build = self.provisioner.ensure_latest().await?;
        self.with_selected(|engine, install| engine.patch(install, &build))
    }

    pub fn unpatch_selected(&mut self) -> InstallerResult<UnpatchOutcome> {
        self.with_selected(|engine, install| engine.unpatch(install))
    }

    /// Install OpenAsar, or remove it when already present.
    ///
    /// Installing fails with `ConsentRequired` until the session accepted the notice.
    pub async fn toggle_open_asar_selected(&mut self) -> InstallerResult<OpenAsarToggle> {
        let installed = self.with_selected(|engine, install| Ok(engine.refresh_open_asar(install)))?;
        if installed {
            return self
                .with_selected(|engine, install| engine.uninstall_open_asar(install))
                .map(OpenAsarToggle::Uninstalled);
        }

        let consent = self.session.open_asar_consent()?;
        let archive = OpenAsarArchive::fetch(
            &self.downloader,
            &self.settings.open_asar_url,
            self.paths.files_dir(),
        )
        .await?;
        self.with_selected(|engine, install| engine.install_open_asar(install, &archive, consent))?;
        Ok(OpenAsarToggle::Installed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::install::ENTRY_FILE;
    use crate::core::platform::HostOs;
    use std::path::PathBuf;

    fn host(root: &std::path::Path) -> HostEnv {
        HostEnv {
            os: HostOs::Linux,
            home: Some(root.join("home")),
            config_dir: Some(root.join("config")),
            local_app_data: None,
            program_data: None,
            username: None,
            user_data_dir: Some(root.join("data")),
            discord_user_data_dir: None,
            dev_install: false,
            current_dir: PathBuf::from(root),
        }
    }

    #[tokio::test]
    async fn custom_path_must_validate() {
        let tmp = tempfile::tempdir().unwrap();
        let mut state = InstallerState::new(host(tmp.path())).unwrap();
        assert!(state.paths.files_dir().is_dir());

        state.session.set_custom_path(&tmp.path().join("nowhere").display().to_string());
        let err = state.unpatch_selected().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocation);
    }

    #[tokio::test]
    async fn open_asar_needs_consent_before_download() {
        let tmp = tempfile::tempdir().unwrap();
        let discord = tmp.path().join("discord");
        std::fs::create_dir_all(discord.join("resources")).unwrap();
        std::fs::write(discord.join("resources").join(ENTRY_FILE), b"plain").unwrap();

        let mut state = InstallerState::new(host(tmp.path())).unwrap();
        state.session.set_custom_path(&discord.display().to_string());
        let err = state.toggle_open_asar_selected().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConsentRequired);
        assert_eq!(
            std::fs::read(discord.join("resources").join(ENTRY_FILE)).unwrap(),
            b"plain"
        );
    }
}
