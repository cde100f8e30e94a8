use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Discord's entry archive inside a resources directory.
pub const ENTRY_FILE: &str = "app.asar";
/// Pristine copy of the entry archive, written on first patch.
pub const BACKUP_FILE: &str = "_app.asar";

/// Release channels Discord ships.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Stable,
    Canary,
    Ptb,
    Development,
}

impl Branch {
    /// Derives the branch from a directory or bundle name by suffix,
    /// case-insensitively. Anything unmatched is stable.
    pub fn from_name(name: &str) -> Self {
        let name = name.to_lowercase();
        let name = name.strip_suffix(".app").unwrap_or(&name);
        if name.ends_with("canary") {
            Branch::Canary
        } else if name.ends_with("development") {
            Branch::Development
        } else if name.ends_with("ptb") {
            Branch::Ptb
        } else {
            Branch::Stable
        }
    }
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Branch::Stable => write!(f, "Stable"),
            Branch::Canary => write!(f, "Canary"),
            Branch::Ptb => write!(f, "PTB"),
            Branch::Development => write!(f, "Development"),
        }
    }
}

/// One discovered or user-specified copy of Discord on disk.
///
/// Rebuilt every run and never persisted. Fields are only changed by the
/// patch engine; everything else reads them through the accessors.
#[derive(Debug, Clone, Serialize)]
pub struct Install {
    path: PathBuf,
    branch: Branch,
    /// Newest first. Windows keeps one `app-<version>/resources` per host version.
    resource_dirs: Vec<PathBuf>,
    is_patched: bool,
    is_open_asar: bool,
}

impl Install {
    pub(crate) fn new(path: PathBuf, branch: Branch, resource_dirs: Vec<PathBuf>) -> Self {
        let mut install = Self {
            path,
            branch,
            resource_dirs,
            is_patched: false,
            is_open_asar: false,
        };
        install.is_patched = install
            .primary_resources()
            .map(|dir| dir.join(BACKUP_FILE).exists())
            .unwrap_or(false);
        install
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn branch(&self) -> Branch {
        self.branch
    }

    pub fn resource_dirs(&self) -> &[PathBuf] {
        &self.resource_dirs
    }

    /// Resources directory of the newest host version.
    pub fn primary_resources(&self) -> Option<&Path> {
        self.resource_dirs.first().map(PathBuf::as_path)
    }

    pub fn is_patched(&self) -> bool {
        self.is_patched
    }

    /// Last observed OpenAsar state; refreshed by every engine call.
    pub fn is_open_asar(&self) -> bool {
        self.is_open_asar
    }

    pub(crate) fn set_patched(&mut self, patched: bool) {
        self.is_patched = patched;
    }

    pub(crate) fn set_open_asar(&mut self, installed: bool) {
        self.is_open_asar = installed;
    }

    /// Label used by front ends, e.g. `Canary - /opt/discord-canary [Patched]`.
    pub fn label(&self) -> String {
        let mut text = format!("{} - {}", self.branch, self.path.display());
        if self.is_patched {
            text.push_str(" [Patched]");
        }
        text
    }
}

/// What the user picked in the install list.
#[derive(Debug, Clone)]
pub enum InstallChoice {
    Known(Install),
    /// Raw user input, only an `Install` once it passes validation.
    PendingCustomPath(String),
}
