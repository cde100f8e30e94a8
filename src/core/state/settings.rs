use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{InstallerError, InstallerResult};
use crate::core::patch::OPEN_ASAR_URL;

pub const SETTINGS_FILE: &str = "installer_settings.json";

const BUILD_RELEASE_URL: &str = "https://api.github.com/repos/VencordJP/Vencord/releases/latest";
const INSTALLER_RELEASE_URL: &str =
    "https://api.github.com/repos/VencordJP/VencordInstaller/releases/latest";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Optional overrides read from the data directory. Every field falls back
/// to the built-in default when missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerSettings {
    /// Tried in order until one answers.
    pub build_endpoints: Vec<String>,
    pub installer_release_endpoint: String,
    pub open_asar_url: String,
    pub http_timeout_secs: u64,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            build_endpoints: vec![BUILD_RELEASE_URL.to_string()],
            installer_release_endpoint: INSTALLER_RELEASE_URL.to_string(),
            open_asar_url: OPEN_ASAR_URL.to_string(),
            http_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl InstallerSettings {
    /// Missing file means defaults; a malformed one is logged and ignored.
    pub fn load(base_dir: &Path) -> Self {
        let path = base_dir.join(SETTINGS_FILE);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring malformed {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, base_dir: &Path) -> InstallerResult<()> {
        let path = base_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|source| InstallerError::Io { path, source })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = InstallerSettings::load(tmp.path());
        assert_eq!(settings, InstallerSettings::default());
        assert_eq!(settings.build_endpoints, vec![BUILD_RELEASE_URL.to_string()]);
        assert!(settings.installer_release_endpoint.contains("/VencordJP/"));
        assert_eq!(settings.http_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(SETTINGS_FILE),
            r#"{ "http_timeout_secs": 30 }"#,
        )
        .unwrap();
        let settings = InstallerSettings::load(tmp.path());
        assert_eq!(settings.http_timeout_secs, 30);
        assert_eq!(settings.open_asar_url, OPEN_ASAR_URL);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(SETTINGS_FILE), "{ nope").unwrap();
        assert_eq!(
            InstallerSettings::load(tmp.path()),
            InstallerSettings::default()
        );
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = InstallerSettings {
            build_endpoints: vec!["https://mirror.example/vencord".into()],
            ..InstallerSettings::default()
        };
        settings.save(tmp.path()).unwrap();
        assert_eq!(InstallerSettings::load(tmp.path()), settings);
    }
}
