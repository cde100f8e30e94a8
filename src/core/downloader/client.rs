use std::path::Path;

use futures_util::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::core::error::{InstallerError, InstallerResult};

const MIN_FREE_DISK_BYTES: u64 = 64 * 1024 * 1024;

/// Streaming, SHA-256 validated downloader.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Download `url` to `dest`, returning the SHA-256 of what was written.
    ///
    /// When `sha256_expected` is given and does not match, `dest` is removed and
    /// `IntegrityMismatch` is returned. Drops the file handle before returning
    /// so the caller can rename the file on Windows.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        sha256_expected: Option<&str>,
    ) -> InstallerResult<String> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| InstallerError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            ensure_min_disk_space(parent, MIN_FREE_DISK_BYTES)?;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(InstallerError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut hasher = Sha256::new();
        {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|source| InstallerError::Io {
                    path: dest.to_path_buf(),
                    source,
                })?;

            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        drop(file);
                        let _ = tokio::fs::remove_file(dest).await;
                        return Err(e.into());
                    }
                };
                hasher.update(&chunk);
                file.write_all(&chunk)
                    .await
                    .map_err(|source| InstallerError::Io {
                        path: dest.to_path_buf(),
                        source,
                    })?;
            }

            file.flush().await.map_err(|source| InstallerError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
            file.sync_all().await.map_err(|source| InstallerError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
        }

        let actual = hex::encode(hasher.finalize());
        if let Some(expected) = sha256_expected {
            if !actual.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(dest).await;
                return Err(InstallerError::IntegrityMismatch {
                    name: url.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        debug!("Downloaded: {} -> {:?}", url, dest);
        Ok(actual)
    }
}

/// Refuse to start a download onto a disk that is nearly full.
fn ensure_min_disk_space(path: &Path, minimum_bytes: u64) -> InstallerResult<()> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut best_len = 0usize;
    let mut available = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if canonical.starts_with(mount) {
            let len = mount.as_os_str().len();
            if len >= best_len {
                best_len = len;
                available = Some(disk.available_space());
            }
        }
    }

    match available {
        Some(bytes) if bytes < minimum_bytes => Err(InstallerError::Other(format!(
            "Not enough disk space at {:?}: available={} required={}",
            canonical, bytes, minimum_bytes
        ))),
        Some(_) => Ok(()),
        None => {
            warn!("Could not determine free space for {:?}", canonical);
            Ok(())
        }
    }
}
