use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::core::platform::HostOs;

/// Central error type for the installer core.
/// Every module returns `Result<T, InstallerError>`.
#[derive(Debug, Error)]
pub enum InstallerError {
    // ── Configuration ───────────────────────────────────
    #[error("Failed to prepare data directory {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    // ── Filesystem (classified) ─────────────────────────
    #[error("Permission denied at {path:?}")]
    PermissionDenied { path: PathBuf, remedy: String },

    #[error("{path:?} is in use by another process")]
    ResourceBusy { path: PathBuf },

    #[error("IO error at {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    // ── Installs ────────────────────────────────────────
    #[error("No valid Discord install found at {0:?}")]
    InvalidLocation(PathBuf),

    #[error("Scuffed Discord install detected, delete {folder:?} first")]
    ScuffedInstall { folder: PathBuf },

    #[error("Install at {0:?} is not patched")]
    NotPatched(PathBuf),

    #[error("OpenAsar install requires consent")]
    ConsentRequired,

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-256 mismatch for {name}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Remote metadata unavailable: {0}")]
    NetworkUnavailable(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Generic ─────────────────────────────────────────
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type InstallerResult<T> = Result<T, InstallerError>;

impl From<io::Error> for InstallerError {
    fn from(source: io::Error) -> Self {
        InstallerError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

/// User-actionable category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    PermissionDenied,
    ResourceBusy,
    InvalidLocation,
    ScuffedInstall,
    NotPatched,
    ConsentRequired,
    IntegrityMismatch,
    NetworkUnavailable,
    Unsupported,
    Other,
}

/// Rendered form of an error for whatever front end shows it.
#[derive(Debug, Clone, Serialize)]
pub struct UserMessage {
    pub kind: ErrorKind,
    pub title: String,
    pub explanation: String,
    pub remedy: Option<String>,
}

impl InstallerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InstallerError::Config { .. } => ErrorKind::Config,
            InstallerError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            InstallerError::ResourceBusy { .. } => ErrorKind::ResourceBusy,
            InstallerError::InvalidLocation(_) => ErrorKind::InvalidLocation,
            InstallerError::ScuffedInstall { .. } => ErrorKind::ScuffedInstall,
            InstallerError::NotPatched(_) => ErrorKind::NotPatched,
            InstallerError::ConsentRequired => ErrorKind::ConsentRequired,
            InstallerError::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            InstallerError::Http(_)
            | InstallerError::DownloadFailed { .. }
            | InstallerError::NetworkUnavailable(_) => ErrorKind::NetworkUnavailable,
            InstallerError::Unsupported(_) => ErrorKind::Unsupported,
            InstallerError::Io { .. } | InstallerError::Json(_) | InstallerError::Other(_) => {
                ErrorKind::Other
            }
        }
    }

    pub fn user_message(&self) -> UserMessage {
        let kind = self.kind();
        let (title, explanation, remedy) = match self {
            InstallerError::Config { path, reason } => (
                "Failed to create the data directory",
                format!("{} ({reason})", path.display()),
                Some("Resolve this error, then restart the installer.".to_string()),
            ),
            InstallerError::PermissionDenied { remedy, .. } => (
                "Permission denied",
                self.to_string(),
                Some(remedy.clone()),
            ),
            InstallerError::ResourceBusy { .. } => (
                "Discord is still running",
                "Cannot patch because Discord's files are used by a different process."
                    .to_string(),
                Some("Make sure you fully close Discord (including the tray) before trying again.".to_string()),
            ),
            InstallerError::InvalidLocation(_) => (
                "Invalid location",
                "The specified location is not a valid Discord install.".to_string(),
                Some("Make sure you select the base folder.".to_string()),
            ),
            InstallerError::ScuffedInstall { folder } => (
                "Hold On!",
                "You have a broken Discord install. Sometimes Discord decides to install to the wrong location for some reason."
                    .to_string(),
                Some(format!(
                    "Delete the Discord or Squirrel folder inside {}, then check that Discord still starts.",
                    folder.display()
                )),
            ),
            InstallerError::NotPatched(_) => (
                "Nothing to uninstall",
                self.to_string(),
                None,
            ),
            InstallerError::ConsentRequired => (
                "OpenAsar",
                "OpenAsar is an open-source alternative of Discord desktop's app.asar and is not affiliated with Vencord."
                    .to_string(),
                Some("Accept the notice, then try installing OpenAsar again.".to_string()),
            ),
            InstallerError::IntegrityMismatch { .. } => (
                "Download corrupted",
                self.to_string(),
                Some("The previous files were kept. Try again later.".to_string()),
            ),
            InstallerError::Http(_)
            | InstallerError::DownloadFailed { .. }
            | InstallerError::NetworkUnavailable(_) => (
                "Network error",
                self.to_string(),
                Some("Check your internet connection and try again.".to_string()),
            ),
            InstallerError::Unsupported(_) => ("Unsupported", self.to_string(), None),
            InstallerError::Io { .. } | InstallerError::Json(_) | InstallerError::Other(_) => {
                ("Something went wrong", self.to_string(), None)
            }
        };

        UserMessage {
            kind,
            title: title.to_string(),
            explanation,
            remedy,
        }
    }
}

// ── Classification ─────────────────────────────────────

#[cfg(windows)]
fn is_busy(err: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    matches!(err.raw_os_error(), Some(32) | Some(33))
}

#[cfg(unix)]
fn is_busy(err: &io::Error) -> bool {
    // EBUSY, ETXTBSY
    matches!(err.raw_os_error(), Some(16) | Some(26))
}

#[cfg(not(any(windows, unix)))]
fn is_busy(_err: &io::Error) -> bool {
    false
}

/// Remedy text for a permission failure on `install_root`, worded per OS.
pub fn permission_remedy(os: HostOs, install_root: &Path) -> String {
    match os {
        HostOs::Windows => {
            "Make sure Discord is fully closed (from the tray too), or run the installer as Administrator."
                .to_string()
        }
        HostOs::MacOs => format!(
            "Grant the installer Full Disk Access in System Settings (Privacy & Security). \
             If that doesn't work, run this in a terminal: sudo chown -R \"${{USER}}:wheel\" {:?}",
            install_root
        ),
        HostOs::Linux => "Try running the installer as root.".to_string(),
    }
}

/// Maps an OS-level failure on `path` into the category a user can act on.
pub fn classify_io(source: io::Error, path: &Path, install_root: &Path) -> InstallerError {
    if is_busy(&source) {
        return InstallerError::ResourceBusy {
            path: path.to_path_buf(),
        };
    }

    if source.kind() == io::ErrorKind::PermissionDenied {
        return InstallerError::PermissionDenied {
            path: path.to_path_buf(),
            remedy: permission_remedy(HostOs::current(), install_root),
        };
    }

    InstallerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ── Serialization for front ends ────────────────────────
impl serde::Serialize for InstallerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_error_is_classified_with_remedy() {
        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        let classified = classify_io(err, Path::new("/x/app.asar"), Path::new("/x"));
        assert_eq!(classified.kind(), ErrorKind::PermissionDenied);
        assert!(classified.user_message().remedy.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn text_file_busy_is_resource_busy() {
        let err = io::Error::from_raw_os_error(26);
        let classified = classify_io(err, Path::new("/x/app.asar"), Path::new("/x"));
        assert_eq!(classified.kind(), ErrorKind::ResourceBusy);
    }

    #[cfg(windows)]
    #[test]
    fn sharing_violation_is_resource_busy() {
        let err = io::Error::from_raw_os_error(32);
        let classified = classify_io(err, Path::new("C:\\x\\app.asar"), Path::new("C:\\x"));
        assert_eq!(classified.kind(), ErrorKind::ResourceBusy);
    }

    #[test]
    fn other_io_errors_stay_io() {
        let err = io::Error::from(io::ErrorKind::NotFound);
        let classified = classify_io(err, Path::new("/x/app.asar"), Path::new("/x"));
        assert_eq!(classified.kind(), ErrorKind::Other);
    }

    #[test]
    fn mac_remedy_mentions_chown() {
        let text = permission_remedy(HostOs::MacOs, Path::new("/Applications/Discord.app"));
        assert!(text.contains("chown"));
        assert!(text.contains("Discord.app"));
    }

    #[test]
    fn network_errors_share_a_kind() {
        let err = InstallerError::DownloadFailed {
            url: "https://example.com".into(),
            status: 503,
        };
        assert_eq!(err.kind(), ErrorKind::NetworkUnavailable);
        assert_eq!(
            InstallerError::NetworkUnavailable("down".into()).kind(),
            ErrorKind::NetworkUnavailable
        );
    }
}
