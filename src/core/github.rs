// ─── GitHub Releases ───
// Both remote endpoints (modification build and installer release) serve the
// GitHub "latest release" JSON shape.

use serde::Deserialize;
use tracing::{info, warn};

use crate::core::error::{InstallerError, InstallerResult};

#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    #[serde(default)]
    pub name: Option<String>,
    pub tag_name: String,
    #[serde(default)]
    pub target_commitish: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubAsset {
    pub name: String,
    pub browser_download_url: String,
    /// `sha256:<hex>` on releases published after mid-2025.
    #[serde(default)]
    pub digest: Option<String>,
}

impl GithubRelease {
    /// Fetch a release document from `url`.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> InstallerResult<Self> {
        info!("Fetching release metadata from {}", url);

        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(InstallerError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let release: GithubRelease = response.json().await?;
        info!(
            "Latest release {} with {} asset(s)",
            release.tag_name,
            release.assets.len()
        );
        Ok(release)
    }

    /// Try each endpoint in order and return the first release that loads.
    pub async fn fetch_first(client: &reqwest::Client, urls: &[String]) -> InstallerResult<Self> {
        let mut failures = Vec::new();
        for url in urls {
            match Self::fetch(client, url).await {
                Ok(release) => return Ok(release),
                Err(e) => {
                    warn!("Release endpoint {} failed: {}", url, e);
                    failures.push(format!("{url}: {e}"));
                }
            }
        }

        Err(InstallerError::NetworkUnavailable(if failures.is_empty() {
            "no release endpoints configured".to_string()
        } else {
            failures.join("; ")
        }))
    }

    pub fn asset(&self, name: &str) -> Option<&GithubAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }

    /// Human-readable name, falling back to the tag.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.tag_name)
    }
}
