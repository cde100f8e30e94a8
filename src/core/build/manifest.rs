// ─── Build Manifest ───
// Remote description of the latest modification build, compared against what
// the cache directory currently holds.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::downloader::{normalize_sha256, sha256_file};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::github::GithubRelease;

/// Entry point Discord is pointed at by the loader stub.
pub const PATCHER_FILE: &str = "patcher.js";
/// Every file a complete build consists of.
pub const BUILD_FILES: [&str; 4] = [PATCHER_FILE, "preload.js", "renderer.js", "renderer.css"];
/// Sidecar metadata next to the cached build.
pub const SIDECAR_FILE: &str = "build.json";

/// A single downloadable file of the remote build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestAsset {
    pub name: String,
    pub url: String,
    pub sha256: String,
}

/// Latest build as published remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteBuild {
    pub release_name: String,
    pub assets: Vec<ManifestAsset>,
}

impl RemoteBuild {
    pub fn from_release(release: &GithubRelease) -> InstallerResult<Self> {
        let mut assets = Vec::new();
        for name in BUILD_FILES {
            let Some(asset) = release.asset(name) else {
                continue;
            };
            let sha256 = asset
                .digest
                .as_deref()
                .and_then(normalize_sha256)
                .ok_or_else(|| {
                    InstallerError::NetworkUnavailable(format!(
                        "release {} publishes no SHA-256 digest for {name}",
                        release.tag_name
                    ))
                })?;
            assets.push(ManifestAsset {
                name: name.to_string(),
                url: asset.browser_download_url.clone(),
                sha256,
            });
        }

        if !assets.iter().any(|asset| asset.name == PATCHER_FILE) {
            return Err(InstallerError::NetworkUnavailable(format!(
                "release {} has no {PATCHER_FILE}",
                release.tag_name
            )));
        }

        Ok(Self {
            release_name: release.display_name().to_string(),
            assets,
        })
    }

    pub fn content_hash(&self) -> String {
        build_hash(
            self.assets
                .iter()
                .map(|asset| (asset.name.as_str(), asset.sha256.as_str())),
        )
    }
}

/// Local versus remote view of the build, fetched once per run.
#[derive(Debug, Clone, Serialize)]
pub struct BuildManifest {
    pub local_hash: Option<String>,
    pub remote_hash: String,
    pub release_name: String,
    pub assets: Vec<ManifestAsset>,
}

impl BuildManifest {
    pub fn new(local_hash: Option<String>, remote: &RemoteBuild) -> Self {
        Self {
            local_hash,
            remote_hash: remote.content_hash(),
            release_name: remote.release_name.clone(),
            assets: remote.assets.clone(),
        }
    }

    /// Asset URLs in download order.
    pub fn download_urls(&self) -> Vec<&str> {
        self.assets.iter().map(|asset| asset.url.as_str()).collect()
    }

    pub fn is_up_to_date(&self) -> bool {
        self.local_hash.as_deref() == Some(self.remote_hash.as_str())
    }

    pub fn status(&self) -> BuildStatus {
        if self.is_up_to_date() {
            BuildStatus::UpToDate {
                hash: self.remote_hash.clone(),
            }
        } else {
            BuildStatus::Stale {
                local: self.local_hash.clone(),
                remote: self.remote_hash.clone(),
            }
        }
    }
}

/// What front ends render about the cached build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildStatus {
    UpToDate { hash: String },
    Stale { local: Option<String>, remote: String },
    Unknown { local: Option<String>, reason: String },
    /// Developer install, never updated.
    Dev,
}

impl BuildStatus {
    /// Fold a finished manifest check into a status; fetch errors become `Unknown`.
    pub fn from_check(result: &InstallerResult<BuildManifest>, local: Option<String>) -> Self {
        match result {
            Ok(manifest) => manifest.status(),
            Err(e) => BuildStatus::Unknown {
                local,
                reason: e.to_string(),
            },
        }
    }
}

/// Sidecar written after every successful promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    pub release_name: String,
    pub installed_at: DateTime<Utc>,
    /// File name → SHA-256 at promotion time.
    pub files: BTreeMap<String, String>,
}

impl BuildRecord {
    pub fn read(files_dir: &Path) -> Option<Self> {
        let raw = std::fs::read(files_dir.join(SIDECAR_FILE)).ok()?;
        serde_json::from_slice(&raw).ok()
    }
}

/// Combined content hash of a build: SHA-256 over sorted `name:digest` lines.
pub fn build_hash<'a>(entries: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let mut entries: Vec<_> = entries.collect();
    entries.sort();
    let mut hasher = Sha256::new();
    for (name, digest) in entries {
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(digest.to_ascii_lowercase().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Recompute the content hash of what the cache directory holds right now.
///
/// The file set comes from the sidecar; any missing or unreadable file means
/// there is no usable local build.
pub fn local_build_hash(files_dir: &Path) -> Option<String> {
    let record = BuildRecord::read(files_dir)?;
    if !record.files.contains_key(PATCHER_FILE) {
        return None;
    }

    let mut digests = Vec::with_capacity(record.files.len());
    for name in record.files.keys() {
        match sha256_file(&files_dir.join(name)) {
            Ok(digest) => digests.push((name.clone(), digest)),
            Err(e) => {
                debug!("Local build incomplete: {}", e);
                return None;
            }
        }
    }

    Some(build_hash(
        digests.iter().map(|(n, d)| (n.as_str(), d.as_str())),
    ))
}

/// First seven characters, the way commit hashes are usually shown.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::sha256_hex;
    use crate::core::github::GithubAsset;

    fn release_with(assets: Vec<GithubAsset>) -> GithubRelease {
        GithubRelease {
            name: Some("Vencord Devbuild".into()),
            tag_name: "devbuild".into(),
            target_commitish: None,
            html_url: None,
            assets,
        }
    }

    fn asset(name: &str, digest: Option<&str>) -> GithubAsset {
        GithubAsset {
            name: name.into(),
            browser_download_url: format!("https://example.com/{name}"),
            digest: digest.map(str::to_string),
        }
    }

    #[test]
    fn build_hash_ignores_order() {
        let a = build_hash([("a", "1"), ("b", "2")].into_iter());
        let b = build_hash([("b", "2"), ("a", "1")].into_iter());
        assert_eq!(a, b);
    }

    #[test]
    fn remote_build_requires_digests() {
        let release = release_with(vec![asset("patcher.js", None)]);
        assert!(RemoteBuild::from_release(&release).is_err());
    }

    #[test]
    fn remote_build_requires_patcher() {
        let digest = format!("sha256:{}", sha256_hex(b"x"));
        let release = release_with(vec![asset("renderer.js", Some(&digest))]);
        assert!(RemoteBuild::from_release(&release).is_err());
    }

    #[test]
    fn remote_build_skips_unrelated_assets() {
        let digest = format!("sha256:{}", sha256_hex(b"x"));
        let release = release_with(vec![
            asset("patcher.js", Some(&digest)),
            asset("extension.zip", None),
        ]);
        let remote = RemoteBuild::from_release(&release).unwrap();
        assert_eq!(remote.assets.len(), 1);
        assert_eq!(remote.release_name, "Vencord Devbuild");
    }

    #[test]
    fn local_hash_matches_remote_for_same_content() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(PATCHER_FILE), b"patcher").unwrap();
        let record = BuildRecord {
            release_name: "x".into(),
            installed_at: Utc::now(),
            files: BTreeMap::from([(PATCHER_FILE.to_string(), sha256_hex(b"patcher"))]),
        };
        std::fs::write(
            tmp.path().join(SIDECAR_FILE),
            serde_json::to_vec(&record).unwrap(),
        )
        .unwrap();

        let remote = RemoteBuild {
            release_name: "x".into(),
            assets: vec![ManifestAsset {
                name: PATCHER_FILE.into(),
                url: "https://example.com/patcher.js".into(),
                sha256: sha256_hex(b"patcher"),
            }],
        };
        let manifest = BuildManifest::new(local_build_hash(tmp.path()), &remote);
        assert!(manifest.is_up_to_date());

        std::fs::write(tmp.path().join(PATCHER_FILE), b"tampered").unwrap();
        let manifest = BuildManifest::new(local_build_hash(tmp.path()), &remote);
        assert!(!manifest.is_up_to_date());
        assert!(matches!(manifest.status(), BuildStatus::Stale { .. }));
    }

    #[test]
    fn missing_sidecar_means_no_local_build() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(PATCHER_FILE), b"patcher").unwrap();
        assert_eq!(local_build_hash(tmp.path()), None);
    }

    #[test]
    fn failed_check_is_unknown() {
        let result: InstallerResult<BuildManifest> =
            Err(InstallerError::NetworkUnavailable("offline".into()));
        let status = BuildStatus::from_check(&result, Some("abc".into()));
        assert!(matches!(status, BuildStatus::Unknown { .. }));
    }

    #[test]
    fn short_hash_truncates() {
        assert_eq!(short_hash("0123456789"), "0123456");
        assert_eq!(short_hash("abc"), "abc");
    }
}
