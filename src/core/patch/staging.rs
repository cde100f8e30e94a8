// ─── Staged Writes ───
// Every write into a Discord install goes through here: temp file in the same
// directory, fsync, re-read and compare, then rename over the target.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::downloader::sha256_hex;
use crate::core::error::{classify_io, InstallerError, InstallerResult};

const TEMP_SUFFIX: &str = ".vencord-tmp";

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{}{TEMP_SUFFIX}", Uuid::new_v4()))
}

/// Atomically replace `target` with `bytes`.
///
/// `install_root` only feeds the remedy text of a classified permission error.
pub fn write_staged(target: &Path, bytes: &[u8], install_root: &Path) -> InstallerResult<()> {
    let temp = temp_path_for(target);
    let result = stage_and_promote(&temp, target, bytes, install_root);
    if result.is_err() && temp.exists() {
        if let Err(e) = fs::remove_file(&temp) {
            warn!("Failed to remove temp file {:?}: {}", temp, e);
        }
    }
    result
}

/// Atomically copy `source` over `target`, same guarantees as [`write_staged`].
pub fn copy_staged(source: &Path, target: &Path, install_root: &Path) -> InstallerResult<()> {
    let bytes = fs::read(source).map_err(|e| classify_io(e, source, install_root))?;
    write_staged(target, &bytes, install_root)
}

fn stage_and_promote(
    temp: &Path,
    target: &Path,
    bytes: &[u8],
    install_root: &Path,
) -> InstallerResult<()> {
    {
        let mut file = File::create(temp).map_err(|e| classify_io(e, target, install_root))?;
        file.write_all(bytes)
            .map_err(|e| classify_io(e, target, install_root))?;
        file.sync_all()
            .map_err(|e| classify_io(e, target, install_root))?;
    }

    let written = fs::read(temp).map_err(|e| classify_io(e, target, install_root))?;
    let expected = sha256_hex(bytes);
    let actual = sha256_hex(&written);
    if expected != actual {
        return Err(InstallerError::IntegrityMismatch {
            name: temp.display().to_string(),
            expected,
            actual,
        });
    }

    fs::rename(temp, target).map_err(|e| classify_io(e, target, install_root))?;
    debug!("Wrote {} bytes to {:?}", bytes.len(), target);
    Ok(())
}

/// Move `target` (file or directory) aside under a temp name in the same
/// directory. The parked path is swept like any other temp file if the
/// process dies before it is discarded.
pub fn park(target: &Path, install_root: &Path) -> InstallerResult<PathBuf> {
    let parked = temp_path_for(target);
    fs::rename(target, &parked).map_err(|e| classify_io(e, target, install_root))?;
    debug!("Parked {:?} at {:?}", target, parked);
    Ok(parked)
}

/// Delete a parked entry once the operation that replaced it committed.
pub fn discard_parked(parked: &Path) {
    if let Err(e) = remove_any(parked) {
        warn!("Failed to remove parked {:?}: {}", parked, e);
    }
}

fn remove_any(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Leftover temp files and parked entries from an interrupted operation in `dir`.
pub fn sweep_temp_files(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') && name.ends_with(TEMP_SUFFIX) {
            if let Err(e) = remove_any(&entry.path()) {
                warn!("Failed to sweep {:?}: {}", entry.path(), e);
            }
        }
    }
}
