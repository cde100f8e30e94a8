use std::path::{Path, PathBuf};

use tracing::warn;

use crate::core::platform::{HostEnv, HostOs};

/// Folders Squirrel may drop under `%PROGRAMDATA%\%USERNAME%` when Discord
/// installs itself for the wrong user.
const MISPLACED_FOLDERS: [&str; 5] = [
    "Discord",
    "DiscordPTB",
    "DiscordCanary",
    "DiscordDevelopment",
    "Squirrel",
];

/// Detects a Discord install placed under the wrong parent directory.
#[derive(Debug, Clone, Default)]
pub struct ScuffedDetector {
    folder: Option<PathBuf>,
}

impl ScuffedDetector {
    /// Windows only; other platforms have no known misplacement quirk.
    pub fn for_host(env: &HostEnv) -> Self {
        if env.os != HostOs::Windows {
            return Self::disabled();
        }
        match (&env.program_data, &env.username) {
            (Some(program_data), Some(user)) => Self::with_folder(program_data.join(user)),
            _ => Self::disabled(),
        }
    }

    pub fn with_folder(folder: PathBuf) -> Self {
        Self {
            folder: Some(folder),
        }
    }

    pub fn disabled() -> Self {
        Self { folder: None }
    }

    /// The offending folder, if one exists.
    pub fn check(&self) -> Option<PathBuf> {
        let folder = self.folder.as_deref()?;
        let offending = find_misplaced(folder)?;
        warn!("Scuffed Discord install detected at {:?}", offending);
        Some(folder.to_path_buf())
    }
}

fn find_misplaced(folder: &Path) -> Option<PathBuf> {
    MISPLACED_FOLDERS
        .iter()
        .map(|name| folder.join(name))
        .find(|candidate| candidate.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_folder_is_not_scuffed() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("SomethingElse")).unwrap();
        assert_eq!(ScuffedDetector::with_folder(tmp.path().into()).check(), None);
    }

    #[test]
    fn squirrel_folder_is_scuffed() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("Squirrel")).unwrap();
        assert_eq!(
            ScuffedDetector::with_folder(tmp.path().into()).check(),
            Some(tmp.path().to_path_buf())
        );
    }

    #[test]
    fn missing_folder_is_not_scuffed() {
        let tmp = tempfile::tempdir().unwrap();
        let detector = ScuffedDetector::with_folder(tmp.path().join("nobody"));
        assert_eq!(detector.check(), None);
        assert_eq!(ScuffedDetector::disabled().check(), None);
    }
}
