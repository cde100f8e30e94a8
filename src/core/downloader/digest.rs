use std::path::Path;

use sha2::{Digest, Sha256};

use crate::core::error::{InstallerError, InstallerResult};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn sha256_file(path: &Path) -> InstallerResult<String> {
    let bytes = std::fs::read(path).map_err(|source| InstallerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(sha256_hex(&bytes))
}

/// GitHub publishes asset digests as `sha256:<hex>`; accept that or bare hex.
pub fn normalize_sha256(raw: &str) -> Option<String> {
    let hex_part = raw.trim().strip_prefix("sha256:").unwrap_or(raw.trim());
    let valid = hex_part.len() == 64 && hex_part.chars().all(|c| c.is_ascii_hexdigit());
    valid.then(|| hex_part.to_ascii_lowercase())
}
