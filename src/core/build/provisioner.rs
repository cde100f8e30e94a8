use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::manifest::{
    local_build_hash, BuildManifest, BuildRecord, BuildStatus, ManifestAsset, RemoteBuild,
    PATCHER_FILE, SIDECAR_FILE,
};
use crate::core::downloader::{sha256_file, Downloader};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::github::GithubRelease;

const STAGING_SUFFIX: &str = ".download";

/// Where builds come from. The GitHub implementation is the only production one.
#[async_trait]
pub trait BuildSource: Send + Sync {
    async fn fetch_latest(&self) -> InstallerResult<RemoteBuild>;

    /// Write the asset at `url` to `dest`. Integrity is checked by the caller.
    async fn download(&self, url: &str, dest: &Path) -> InstallerResult<()>;
}

pub struct GithubBuildSource {
    downloader: Downloader,
    endpoints: Vec<String>,
}

impl GithubBuildSource {
    pub fn new(downloader: Downloader, endpoints: Vec<String>) -> Self {
        Self {
            downloader,
            endpoints,
        }
    }
}

#[async_trait]
impl BuildSource for GithubBuildSource {
    async fn fetch_latest(&self) -> InstallerResult<RemoteBuild> {
        let release = GithubRelease::fetch_first(self.downloader.client(), &self.endpoints).await?;
        RemoteBuild::from_release(&release)
    }

    async fn download(&self, url: &str, dest: &Path) -> InstallerResult<()> {
        self.downloader.download_file(url, dest, None).await?;
        Ok(())
    }
}

/// Proof that the cache holds a build whose content matched its manifest.
///
/// Only the provisioner hands these out; patching requires one.
#[derive(Debug, Clone)]
pub struct VerifiedBuild {
    hash: String,
    patcher: PathBuf,
}

impl VerifiedBuild {
    pub(crate) fn new(hash: impl Into<String>, patcher: PathBuf) -> Self {
        Self {
            hash: hash.into(),
            patcher,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Absolute path the loader stub points Discord at.
    pub fn patcher_path(&self) -> &Path {
        &self.patcher
    }
}

/// Keeps the shared cache directory in sync with the latest remote build.
pub struct BuildProvisioner {
    files_dir: PathBuf,
    dev_install: bool,
    source: Arc<dyn BuildSource>,
    remote: OnceCell<RemoteBuild>,
    promote: Mutex<()>,
}

impl BuildProvisioner {
    pub fn new(files_dir: PathBuf, dev_install: bool, source: Arc<dyn BuildSource>) -> Self {
        Self {
            files_dir,
            dev_install,
            source,
            remote: OnceCell::new(),
            promote: Mutex::new(()),
        }
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn is_dev_install(&self) -> bool {
        self.dev_install
    }

    /// Content hash of the cached build, recomputed from disk.
    pub fn local_hash(&self) -> Option<String> {
        local_build_hash(&self.files_dir)
    }

    /// Remove staging files abandoned by a previous run.
    pub fn sweep_stale_staging(&self) {
        let Ok(entries) = std::fs::read_dir(&self.files_dir) else {
            return;
        };
        for entry in entries.filter_map(Result::ok) {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') && name.ends_with(STAGING_SUFFIX) {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => debug!("Removed stale staging file {}", name),
                    Err(e) => warn!("Failed to remove stale staging file {}: {}", name, e),
                }
            }
        }
    }

    /// Fetch the remote manifest (once per run) and compare it to the cache.
    #[instrument(skip(self))]
    pub async fn check(&self) -> InstallerResult<BuildManifest> {
        if self.dev_install {
            return Err(InstallerError::Unsupported(
                "developer installs never fetch remote builds".to_string(),
            ));
        }
        let remote = self
            .remote
            .get_or_try_init(|| self.source.fetch_latest())
            .await?;
        let manifest = BuildManifest::new(self.local_hash(), remote);
        info!(
            "Build check: local={:?} remote={} up_to_date={}",
            manifest.local_hash,
            manifest.remote_hash,
            manifest.is_up_to_date()
        );
        Ok(manifest)
    }

    /// Status for front ends after a finished check.
    pub fn status(&self, result: &InstallerResult<BuildManifest>) -> BuildStatus {
        if self.dev_install {
            return BuildStatus::Dev;
        }
        BuildStatus::from_check(result, self.local_hash())
    }

    /// Make sure the cache holds the latest verified build and return it.
    ///
    /// Stale assets are downloaded to staging files, re-hashed and promoted by
    /// rename only if every one matches the manifest. On any mismatch nothing is
    /// promoted and the previous cache content stays as it was.
    #[instrument(skip(self))]
    pub async fn ensure_latest(&self) -> InstallerResult<VerifiedBuild> {
        if self.dev_install {
            return self.dev_build();
        }

        let mut manifest = self.check().await?;
        let _promote = self.promote.lock().await;

        // Another caller may have promoted while we waited.
        manifest.local_hash = self.local_hash();
        if manifest.is_up_to_date() {
            debug!("Cached build already up to date");
            return Ok(self.verified(&manifest.remote_hash));
        }

        info!("Downloading build {}", manifest.release_name);
        let staged = self.stage_assets(&manifest.assets).await?;
        promote_all(&staged)?;
        self.write_sidecar(&manifest)?;

        match self.local_hash() {
            Some(hash) if hash == manifest.remote_hash => Ok(self.verified(&hash)),
            other => Err(InstallerError::IntegrityMismatch {
                name: SIDECAR_FILE.to_string(),
                expected: manifest.remote_hash.clone(),
                actual: other.unwrap_or_default(),
            }),
        }
    }

    fn verified(&self, hash: &str) -> VerifiedBuild {
        VerifiedBuild::new(hash, self.files_dir.join(PATCHER_FILE))
    }

    fn dev_build(&self) -> InstallerResult<VerifiedBuild> {
        let patcher = self.files_dir.join(PATCHER_FILE);
        if !patcher.is_file() {
            return Err(InstallerError::Other(format!(
                "Dev install has no build at {:?}, build it first",
                patcher
            )));
        }
        Ok(VerifiedBuild::new("dev", patcher))
    }

    async fn stage_assets(
        &self,
        assets: &[ManifestAsset],
    ) -> InstallerResult<Vec<(PathBuf, PathBuf)>> {
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();

        for asset in assets {
            let target = self.files_dir.join(&asset.name);
            if sha256_file(&target)
                .map(|d| d.eq_ignore_ascii_case(&asset.sha256))
                .unwrap_or(false)
            {
                continue;
            }

            let staging = self.files_dir.join(format!(
                ".{}.{}{STAGING_SUFFIX}",
                asset.name,
                Uuid::new_v4()
            ));

            let result = match self.source.download(&asset.url, &staging).await {
                Ok(()) => sha256_file(&staging).and_then(|actual| {
                    if actual.eq_ignore_ascii_case(&asset.sha256) {
                        Ok(())
                    } else {
                        Err(InstallerError::IntegrityMismatch {
                            name: asset.name.clone(),
                            expected: asset.sha256.clone(),
                            actual,
                        })
                    }
                }),
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                warn!("Discarding staged build files: {}", e);
                let _ = std::fs::remove_file(&staging);
                for (path, _) in &staged {
                    let _ = std::fs::remove_file(path);
                }
                return Err(e);
            }

            staged.push((staging, target));
        }

        Ok(staged)
    }

    fn write_sidecar(&self, manifest: &BuildManifest) -> InstallerResult<()> {
        let record = BuildRecord {
            release_name: manifest.release_name.clone(),
            installed_at: Utc::now(),
            files: manifest
                .assets
                .iter()
                .map(|asset| (asset.name.clone(), asset.sha256.clone()))
                .collect::<BTreeMap<_, _>>(),
        };

        let path = self.files_dir.join(SIDECAR_FILE);
        let staging = self
            .files_dir
            .join(format!(".{SIDECAR_FILE}.{}{STAGING_SUFFIX}", Uuid::new_v4()));
        let payload = serde_json::to_vec_pretty(&record)?;
        std::fs::write(&staging, payload).map_err(|source| InstallerError::Io {
            path: staging.clone(),
            source,
        })?;
        std::fs::rename(&staging, &path).map_err(|source| {
            let _ = std::fs::remove_file(&staging);
            InstallerError::Io { path, source }
        })
    }
}

/// Move every staged file over its target. When one move fails, the targets
/// promoted so far get their previous contents back.
fn promote_all(staged: &[(PathBuf, PathBuf)]) -> InstallerResult<()> {
    let mut previous: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut promoted: Vec<&Path> = Vec::new();

    for (index, (staging, target)) in staged.iter().enumerate() {
        let result = match set_aside(target) {
            Ok(aside) => {
                previous.extend(aside.map(|aside| (aside, target.clone())));
                std::fs::rename(staging, target).map_err(|source| InstallerError::Io {
                    path: target.clone(),
                    source,
                })
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!("Promotion failed, restoring previous build files: {}", e);
            for path in &promoted {
                let _ = std::fs::remove_file(path);
            }
            for (aside, target) in &previous {
                if let Err(e) = std::fs::rename(aside, target) {
                    warn!("Failed to restore {:?}: {}", target, e);
                }
            }
            for (rest, _) in &staged[index..] {
                let _ = std::fs::remove_file(rest);
            }
            return Err(e);
        }
        promoted.push(target);
        debug!("Promoted {:?}", target);
    }

    for (aside, _) in &previous {
        if let Err(e) = std::fs::remove_file(aside) {
            warn!("Failed to remove previous copy {:?}: {}", aside, e);
        }
    }
    Ok(())
}

/// Rename an existing `target` to a staging name so it can be restored.
fn set_aside(target: &Path) -> InstallerResult<Option<PathBuf>> {
    if !target.exists() {
        return Ok(None);
    }
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let aside = target.with_file_name(format!(".{name}.{}.previous{STAGING_SUFFIX}", Uuid::new_v4()));
    std::fs::rename(target, &aside).map_err(|source| InstallerError::Io {
        path: target.to_path_buf(),
        source,
    })?;
    Ok(Some(aside))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::sha256_hex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves fixed bytes per URL; `declared` is what the manifest claims.
    struct FakeSource {
        declared: Vec<(&'static str, Vec<u8>)>,
        served: HashMap<String, Vec<u8>>,
        fetches: AtomicUsize,
        offline: bool,
    }

    impl FakeSource {
        fn honest(files: Vec<(&'static str, Vec<u8>)>) -> Self {
            let served = files
                .iter()
                .map(|(name, bytes)| (url_for(name), bytes.clone()))
                .collect();
            Self {
                declared: files,
                served,
                fetches: AtomicUsize::new(0),
                offline: false,
            }
        }
    }

    fn url_for(name: &str) -> String {
        format!("https://example.com/{name}")
    }

    #[async_trait]
    impl BuildSource for FakeSource {
        async fn fetch_latest(&self) -> InstallerResult<RemoteBuild> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.offline {
                return Err(InstallerError::NetworkUnavailable("offline".into()));
            }
            Ok(RemoteBuild {
                release_name: "Vencord Devbuild".into(),
                assets: self
                    .declared
                    .iter()
                    .map(|(name, bytes)| ManifestAsset {
                        name: name.to_string(),
                        url: url_for(name),
                        sha256: sha256_hex(bytes),
                    })
                    .collect(),
            })
        }

        async fn download(&self, url: &str, dest: &Path) -> InstallerResult<()> {
            let bytes = self
                .served
                .get(url)
                .ok_or_else(|| InstallerError::DownloadFailed {
                    url: url.to_string(),
                    status: 404,
                })?;
            std::fs::write(dest, bytes)?;
            Ok(())
        }
    }

    fn provisioner(dir: &Path, source: FakeSource) -> (BuildProvisioner, Arc<FakeSource>) {
        let source = Arc::new(source);
        (
            BuildProvisioner::new(dir.to_path_buf(), false, source.clone()),
            source,
        )
    }

    fn staging_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.ends_with(STAGING_SUFFIX))
            .collect()
    }

    #[tokio::test]
    async fn fresh_cache_is_stale_then_up_to_date() {
        let tmp = tempfile::tempdir().unwrap();
        let (prov, _) = provisioner(
            tmp.path(),
            FakeSource::honest(vec![
                ("patcher.js", b"patcher v2".to_vec()),
                ("renderer.js", b"renderer v2".to_vec()),
            ]),
        );

        let manifest = prov.check().await.unwrap();
        assert_eq!(manifest.local_hash, None);
        assert!(!manifest.is_up_to_date());

        let build = prov.ensure_latest().await.unwrap();
        assert_eq!(build.hash(), manifest.remote_hash);
        assert_eq!(std::fs::read(build.patcher_path()).unwrap(), b"patcher v2");
        assert!(prov.check().await.unwrap().is_up_to_date());
        assert!(staging_files(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn manifest_is_fetched_once_per_run() {
        let tmp = tempfile::tempdir().unwrap();
        let (prov, source) = provisioner(
            tmp.path(),
            FakeSource::honest(vec![("patcher.js", b"p".to_vec())]),
        );
        prov.check().await.unwrap();
        prov.ensure_latest().await.unwrap();
        prov.check().await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn integrity_mismatch_leaves_cache_untouched() {
        let tmp = tempfile::tempdir().unwrap();

        // Promote a good build first.
        let (prov, _) = provisioner(
            tmp.path(),
            FakeSource::honest(vec![("patcher.js", b"patcher v1".to_vec())]),
        );
        prov.ensure_latest().await.unwrap();
        let before = std::fs::read(tmp.path().join(PATCHER_FILE)).unwrap();
        let hash_before = prov.local_hash();

        // New run: manifest declares v2 but the server hands out tampered bytes.
        let mut lying = FakeSource::honest(vec![("patcher.js", b"patcher v2".to_vec())]);
        lying
            .served
            .insert(url_for("patcher.js"), b"tampered".to_vec());
        let (prov, _) = provisioner(tmp.path(), lying);

        let err = prov.ensure_latest().await.unwrap_err();
        assert!(matches!(err, InstallerError::IntegrityMismatch { .. }));
        assert_eq!(std::fs::read(tmp.path().join(PATCHER_FILE)).unwrap(), before);
        assert_eq!(prov.local_hash(), hash_before);
        assert!(staging_files(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn partial_mismatch_promotes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut lying = FakeSource::honest(vec![
            ("patcher.js", b"patcher".to_vec()),
            ("renderer.js", b"renderer".to_vec()),
        ]);
        lying
            .served
            .insert(url_for("renderer.js"), b"evil".to_vec());
        let (prov, _) = provisioner(tmp.path(), lying);

        assert!(prov.ensure_latest().await.is_err());
        assert!(!tmp.path().join(PATCHER_FILE).exists());
        assert!(!tmp.path().join(SIDECAR_FILE).exists());
    }

    #[tokio::test]
    async fn fetch_error_aborts_and_reports_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        let mut source = FakeSource::honest(vec![("patcher.js", b"p".to_vec())]);
        source.offline = true;
        let (prov, _) = provisioner(tmp.path(), source);

        let result = prov.check().await;
        assert!(matches!(prov.status(&result), BuildStatus::Unknown { .. }));
        let err = prov.ensure_latest().await.unwrap_err();
        assert!(matches!(err, InstallerError::NetworkUnavailable(_)));
    }

    #[tokio::test]
    async fn dev_install_never_downloads() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(PATCHER_FILE), b"local build").unwrap();
        let mut source = FakeSource::honest(vec![("patcher.js", b"p".to_vec())]);
        source.offline = true;
        let prov = BuildProvisioner::new(tmp.path().to_path_buf(), true, Arc::new(source));

        let build = prov.ensure_latest().await.unwrap();
        assert_eq!(build.hash(), "dev");
        assert_eq!(prov.status(&prov.check().await), BuildStatus::Dev);
    }

    #[test]
    fn sweep_removes_abandoned_staging() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".patcher.js.123.download"), b"half").unwrap();
        std::fs::write(tmp.path().join(PATCHER_FILE), b"keep").unwrap();
        let prov = BuildProvisioner::new(
            tmp.path().to_path_buf(),
            false,
            Arc::new(FakeSource::honest(Vec::new())),
        );
        prov.sweep_stale_staging();
        assert!(staging_files(tmp.path()).is_empty());
        assert!(tmp.path().join(PATCHER_FILE).exists());
    }

    #[test]
    fn failed_promote_restores_previous_files() {
        let tmp = tempfile::tempdir().unwrap();
        let patcher = tmp.path().join(PATCHER_FILE);
        let preload = tmp.path().join("preload.js");
        std::fs::write(&patcher, b"old patcher").unwrap();
        std::fs::write(&preload, b"old preload").unwrap();
        let staged_patcher = tmp.path().join(".patcher.js.a.download");
        std::fs::write(&staged_patcher, b"new patcher").unwrap();
        // Never written, so its move fails after the patcher was promoted.
        let staged_preload = tmp.path().join(".preload.js.b.download");

        let err = promote_all(&[
            (staged_patcher, patcher.clone()),
            (staged_preload, preload.clone()),
        ])
        .unwrap_err();
        assert!(matches!(err, InstallerError::Io { .. }));
        assert_eq!(std::fs::read(&patcher).unwrap(), b"old patcher");
        assert_eq!(std::fs::read(&preload).unwrap(), b"old preload");
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 2);
    }

    #[test]
    fn promote_drops_previous_copies() {
        let tmp = tempfile::tempdir().unwrap();
        let patcher = tmp.path().join(PATCHER_FILE);
        std::fs::write(&patcher, b"old").unwrap();
        let staged = tmp.path().join(".patcher.js.a.download");
        std::fs::write(&staged, b"new").unwrap();

        promote_all(&[(staged, patcher.clone())]).unwrap();
        assert_eq!(std::fs::read(&patcher).unwrap(), b"new");
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }
}
