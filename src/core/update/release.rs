// ─── Installer Releases ───

use serde::Serialize;

use crate::core::downloader::normalize_sha256;
use crate::core::github::GithubRelease;
use crate::core::platform::HostOs;

/// Tag and commit the running binary was built from, embedded by `build.rs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildIdentity {
    pub tag: String,
    pub commit_hash: String,
}

impl BuildIdentity {
    pub fn new(tag: impl Into<String>, commit_hash: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            commit_hash: commit_hash.into(),
        }
    }

    pub fn embedded() -> Self {
        Self::new(env!("INSTALLER_TAG"), env!("INSTALLER_GIT_HASH"))
    }

    /// Local builds without git metadata never ask to be updated.
    pub fn is_dev(&self) -> bool {
        self.commit_hash.is_empty() || self.commit_hash == "unknown"
    }
}

/// Latest published installer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallerRelease {
    pub tag: String,
    pub commit_hash: String,
    /// Asset for this OS/arch, absent when there is none to swap in.
    pub download_link: Option<String>,
    pub html_url: String,
    pub sha256: Option<String>,
}

impl InstallerRelease {
    pub fn from_github(release: &GithubRelease, asset_name: Option<&str>) -> Self {
        let asset = asset_name.and_then(|name| release.asset(name));
        Self {
            tag: release.tag_name.clone(),
            commit_hash: commit_hash_of(release),
            download_link: asset.map(|a| a.browser_download_url.clone()),
            html_url: release.html_url.clone().unwrap_or_else(|| {
                format!(
                    "https://github.com/VencordJP/VencordInstaller/releases/tag/{}",
                    release.tag_name
                )
            }),
            sha256: asset
                .and_then(|a| a.digest.as_deref())
                .and_then(normalize_sha256),
        }
    }

    pub fn is_newer_than(&self, running: &BuildIdentity) -> bool {
        if running.is_dev() {
            return false;
        }
        if self.tag != running.tag {
            return true;
        }
        !self.commit_hash.is_empty() && !same_commit(&self.commit_hash, &running.commit_hash)
    }
}

fn looks_like_commit(s: &str) -> bool {
    (7..=40).contains(&s.len()) && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// `target_commitish` is a branch name on most releases; fall back to the
/// last word of the release name, where the release workflow puts the hash.
fn commit_hash_of(release: &GithubRelease) -> String {
    release
        .target_commitish
        .as_deref()
        .filter(|c| looks_like_commit(c))
        .or_else(|| {
            release
                .name
                .as_deref()
                .and_then(|name| name.split_whitespace().last())
                .map(|word| word.trim_matches(|c: char| c == '(' || c == ')'))
                .filter(|word| looks_like_commit(word))
        })
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Short and full hashes of the same commit compare equal.
fn same_commit(a: &str, b: &str) -> bool {
    let (a, b) = (a.to_ascii_lowercase(), b.to_ascii_lowercase());
    a.starts_with(&b) || b.starts_with(&a)
}

/// Release asset that can replace the running binary, if the platform allows it.
pub fn replaceable_asset(os: HostOs, arch: &str) -> Option<&'static str> {
    match (os, arch) {
        (HostOs::Windows, "x86_64") | (HostOs::Windows, "x86") => Some("VencordInstaller.exe"),
        (HostOs::Linux, "x86_64") => Some("VencordInstaller-linux"),
        (HostOs::Linux, "aarch64") => Some("VencordInstaller-linux-arm64"),
        // macOS builds ship as a signed bundle, updated through the browser.
        _ => None,
    }
}
