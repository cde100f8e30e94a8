// ─── OpenAsar ───
// Replaces Discord's own host archive (not the loader slot) with the OpenAsar
// build. Installed state is always read from disk.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use super::asar;
use crate::core::downloader::Downloader;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::install::{Install, BACKUP_FILE, ENTRY_FILE};

pub const OPEN_ASAR_URL: &str =
    "https://github.com/GooseMod/OpenAsar/releases/download/nightly/app.asar";

const MARKER: &[u8] = b"OpenAsar";
const ORIGINAL_SUFFIX: &str = ".original";

/// Proof the user accepted the OpenAsar notice this session.
///
/// Only [`crate::core::state::SessionState`] hands these out.
#[derive(Debug, Clone, Copy)]
pub struct Consent(());

impl Consent {
    pub(crate) fn granted() -> Self {
        Consent(())
    }
}

/// The archive Discord itself boots: `_app.asar` once patched, else `app.asar`.
pub fn slot_path(resources: &Path) -> PathBuf {
    let backup = resources.join(BACKUP_FILE);
    if backup.is_file() {
        backup
    } else {
        resources.join(ENTRY_FILE)
    }
}

/// Where the host archive is kept while OpenAsar occupies `slot`.
pub fn original_path(slot: &Path) -> PathBuf {
    let mut name = slot.as_os_str().to_owned();
    name.push(ORIGINAL_SUFFIX);
    PathBuf::from(name)
}

fn contains_marker(bytes: &[u8]) -> bool {
    bytes.windows(MARKER.len()).any(|window| window == MARKER)
}

/// Inspect the install's slot for the OpenAsar marker.
pub fn is_open_asar_installed(install: &Install) -> bool {
    let Some(resources) = install.primary_resources() else {
        return false;
    };
    let slot = slot_path(resources);
    match std::fs::read(&slot) {
        Ok(bytes) => contains_marker(&bytes),
        Err(e) => {
            debug!("Cannot read {:?} for OpenAsar check: {}", slot, e);
            false
        }
    }
}

/// A downloaded archive verified to be OpenAsar.
#[derive(Debug, Clone)]
pub struct OpenAsarArchive {
    bytes: Vec<u8>,
}

impl OpenAsarArchive {
    pub fn from_bytes(bytes: Vec<u8>) -> InstallerResult<Self> {
        asar::read_header(&bytes)?;
        if !contains_marker(&bytes) {
            return Err(InstallerError::Other(
                "Downloaded archive is not an OpenAsar build".to_string(),
            ));
        }
        Ok(Self { bytes })
    }

    /// Download the nightly build through a staging file in `staging_dir`.
    pub async fn fetch(
        downloader: &Downloader,
        url: &str,
        staging_dir: &Path,
    ) -> InstallerResult<Self> {
        let staging = staging_dir.join(format!(".openasar.{}.download", Uuid::new_v4()));
        let downloaded = downloader.download_file(url, &staging, None).await;
        let bytes = downloaded.and_then(|_| {
            std::fs::read(&staging).map_err(|source| InstallerError::Io {
                path: staging.clone(),
                source,
            })
        });
        let _ = std::fs::remove_file(&staging);

        let archive = Self::from_bytes(bytes?)?;
        info!("Fetched OpenAsar ({} bytes)", archive.bytes.len());
        Ok(archive)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
pub(crate) fn test_archive() -> OpenAsarArchive {
    let bytes = asar::build(&[
        ("index.js", b"// OpenAsar\nrequire('./bootstrap');"),
        ("package.json", br#"{"name":"discord","main":"index.js"}"#),
    ])
    .unwrap();
    OpenAsarArchive::from_bytes(bytes).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::install::Branch;

    #[test]
    fn slot_follows_patch_state() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(ENTRY_FILE), b"x").unwrap();
        assert_eq!(slot_path(tmp.path()), tmp.path().join(ENTRY_FILE));

        std::fs::write(tmp.path().join(BACKUP_FILE), b"x").unwrap();
        assert_eq!(slot_path(tmp.path()), tmp.path().join(BACKUP_FILE));
        assert_eq!(
            original_path(&slot_path(tmp.path())),
            tmp.path().join("_app.asar.original")
        );
    }

    #[test]
    fn detects_marker_in_slot() {
        let tmp = tempfile::tempdir().unwrap();
        let resources = tmp.path().join("resources");
        std::fs::create_dir(&resources).unwrap();
        std::fs::write(resources.join(ENTRY_FILE), b"plain discord").unwrap();

        let install = Install::new(tmp.path().into(), Branch::Stable, vec![resources.clone()]);
        assert!(!is_open_asar_installed(&install));

        std::fs::write(resources.join(ENTRY_FILE), test_archive().bytes()).unwrap();
        assert!(is_open_asar_installed(&install));
    }

    #[test]
    fn rejects_non_open_asar_archives() {
        let plain = asar::build(&[("index.js", b"console.log(1)")]).unwrap();
        assert!(OpenAsarArchive::from_bytes(plain).is_err());
        assert!(OpenAsarArchive::from_bytes(b"OpenAsar but not an archive".to_vec()).is_err());
    }
}
