use std::path::{Path, PathBuf};

use tracing::info;

use super::{HostEnv, HostOs};
use crate::core::error::{InstallerError, InstallerResult};

const APP_DIR_NAME: &str = "Vencord";
const DISCORD_SIBLING_DIR_NAME: &str = "VencordData";
const FILES_DIR_NAME: &str = "dist";

#[derive(Debug, Clone)]
pub struct PlatformPaths {
    base_dir: PathBuf,
    files_dir: PathBuf,
    install_roots: Vec<PathBuf>,
    dev_install: bool,
}

impl PlatformPaths {
    /// Resolves every directory the installer needs and creates the cache.
    ///
    /// A failure here is fatal: nothing download-dependent can work without it.
    pub fn resolve(env: &HostEnv) -> InstallerResult<Self> {
        let (base_dir, files_dir) = if env.dev_install {
            let files = env.current_dir.join(FILES_DIR_NAME);
            (env.current_dir.clone(), files)
        } else {
            let base = base_dir(env)?;
            let files = base.join(FILES_DIR_NAME);
            (base, files)
        };

        let files_dir = canonical_or_create_dir(&files_dir)?;
        let base_dir = std::fs::canonicalize(&base_dir).unwrap_or(base_dir);

        info!("Files will be downloaded to {:?}", files_dir);

        Ok(Self {
            base_dir,
            files_dir,
            install_roots: install_roots(env),
            dev_install: env.dev_install,
        })
    }

    /// Root of installer-owned data (settings live here).
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Shared cache directory holding the downloaded build.
    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn install_roots(&self) -> &[PathBuf] {
        &self.install_roots
    }

    pub fn is_dev_install(&self) -> bool {
        self.dev_install
    }
}

fn base_dir(env: &HostEnv) -> InstallerResult<PathBuf> {
    if let Some(dir) = &env.user_data_dir {
        return Ok(dir.clone());
    }

    if let Some(dir) = &env.discord_user_data_dir {
        let parent = dir.parent().unwrap_or(dir);
        return Ok(parent.join(DISCORD_SIBLING_DIR_NAME));
    }

    env.config_dir
        .as_ref()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| InstallerError::Config {
            path: PathBuf::from(APP_DIR_NAME),
            reason: "could not determine the user config directory".to_string(),
        })
}

/// Directories where Discord conventionally installs on `env.os`.
///
/// Sandboxed package locations (Flatpak, Snap) are deliberately absent.
pub fn install_roots(env: &HostEnv) -> Vec<PathBuf> {
    let mut roots = Vec::new();

    match env.os {
        HostOs::Windows => {
            if let Some(local) = &env.local_app_data {
                roots.push(local.clone());
            }
        }
        HostOs::MacOs => {
            roots.push(PathBuf::from("/Applications"));
            if let Some(home) = &env.home {
                roots.push(home.join("Applications"));
                roots.push(home.join("Library").join("Application Support"));
            }
        }
        HostOs::Linux => {
            roots.push(PathBuf::from("/usr/share"));
            roots.push(PathBuf::from("/usr/lib64"));
            roots.push(PathBuf::from("/opt"));
            if let Some(home) = &env.home {
                roots.push(home.join(".local").join("share"));
                roots.push(home.join(".dvm"));
            }
        }
    }

    roots
}

/// Paths that belong to sandboxed package formats, which cannot be patched.
pub fn is_sandboxed_location(path: &Path) -> bool {
    let text = path.to_string_lossy().replace('\\', "/").to_ascii_lowercase();
    text.contains("/flatpak/") || text.starts_with("/snap/") || text.contains("/snap/discord")
}

fn canonical_or_create_dir(path: &Path) -> InstallerResult<PathBuf> {
    std::fs::create_dir_all(path).map_err(|source| InstallerError::Config {
        path: path.to_path_buf(),
        reason: source.to_string(),
    })?;

    std::fs::canonicalize(path).map_err(|source| InstallerError::Config {
        path: path.to_path_buf(),
        reason: source.to_string(),
    })
}
