use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::model::{Branch, Install, InstallChoice, BACKUP_FILE, ENTRY_FILE};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::patch::open_asar;
use crate::core::platform::paths::is_sandboxed_location;
use crate::core::platform::{HostOs, PlatformPaths};

/// Scans the platform's install roots for Discord copies.
#[derive(Debug, Clone)]
pub struct InstallLocator {
    os: HostOs,
    roots: Vec<PathBuf>,
}

impl InstallLocator {
    pub fn new(os: HostOs, roots: Vec<PathBuf>) -> Self {
        Self { os, roots }
    }

    pub fn from_paths(os: HostOs, paths: &PlatformPaths) -> Self {
        Self::new(os, paths.install_roots().to_vec())
    }

    /// Walk every root one level deep and keep the candidates that validate.
    ///
    /// Unreadable roots and invalid candidates are skipped, never reported.
    pub fn find(&self) -> Vec<Install> {
        let mut installs = Vec::new();

        for root in &self.roots {
            let mut children = match std::fs::read_dir(root) {
                Ok(entries) => entries
                    .filter_map(Result::ok)
                    .map(|entry| entry.path())
                    .filter(|path| path.is_dir())
                    .collect::<Vec<_>>(),
                Err(e) => {
                    debug!("Skipping install root {:?}: {}", root, e);
                    continue;
                }
            };
            children.sort();

            for child in children {
                let Some(name) = child.file_name().map(|n| n.to_string_lossy().to_string())
                else {
                    continue;
                };
                if !name.to_lowercase().contains("discord") {
                    continue;
                }
                if let Some(install) = self.parse(&child, None) {
                    installs.push(install);
                }
            }
        }

        info!("Found {} Discord install(s)", installs.len());
        installs
    }

    /// Validate `path` as an install root and build an [`Install`] from it.
    ///
    /// Returns `None` when the expected resource layout is missing.
    pub fn parse(&self, path: &Path, branch_hint: Option<Branch>) -> Option<Install> {
        if is_sandboxed_location(path) {
            debug!("Ignoring sandboxed install at {:?}", path);
            return None;
        }

        let resource_dirs = match self.os {
            HostOs::Windows => windows_resource_dirs(path),
            HostOs::MacOs => {
                let is_bundle = path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("app"))
                    .unwrap_or(false);
                if !is_bundle {
                    return None;
                }
                single_resource_dir(path.join("Contents").join("Resources"))
            }
            HostOs::Linux => single_resource_dir(path.join("resources")),
        };

        if resource_dirs.is_empty() {
            return None;
        }

        let branch = branch_hint.unwrap_or_else(|| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            Branch::from_name(&name)
        });

        let mut install = Install::new(path.to_path_buf(), branch, resource_dirs);
        let open_asar = open_asar::is_open_asar_installed(&install);
        install.set_open_asar(open_asar);
        debug!("Valid install: {}", install.label());
        Some(install)
    }

    /// Parse a user-supplied custom location. Never falls back to another path.
    pub fn parse_discord(&self, user_path: &str, branch_hint: Option<Branch>) -> Option<Install> {
        let trimmed = user_path.trim();
        if trimmed.is_empty() {
            return None;
        }
        self.parse(Path::new(trimmed), branch_hint)
    }

    /// Resolve a selection into a concrete install.
    pub fn resolve_choice(&self, choice: InstallChoice) -> InstallerResult<Install> {
        match choice {
            InstallChoice::Known(install) => Ok(install),
            InstallChoice::PendingCustomPath(raw) => self
                .parse_discord(&raw, None)
                .ok_or_else(|| InstallerError::InvalidLocation(PathBuf::from(raw.trim()))),
        }
    }
}

/// The layout predicate: a resources folder holding the entry archive or its backup.
pub fn has_resource_layout(resources: &Path) -> bool {
    resources.is_dir()
        && (resources.join(ENTRY_FILE).exists() || resources.join(BACKUP_FILE).exists())
}

fn single_resource_dir(resources: PathBuf) -> Vec<PathBuf> {
    if has_resource_layout(&resources) {
        vec![resources]
    } else {
        Vec::new()
    }
}

/// Squirrel installs keep every host version in its own `app-<version>` folder.
fn windows_resource_dirs(path: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(path) else {
        return Vec::new();
    };

    let mut versions = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let version = name.strip_prefix("app-")?;
            let resources = entry.path().join("resources");
            has_resource_layout(&resources).then(|| (parse_version(version), resources))
        })
        .collect::<Vec<_>>();

    versions.sort_by(|a, b| b.0.cmp(&a.0));
    versions.into_iter().map(|(_, resources)| resources).collect()
}

fn parse_version(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_linux_install(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(dir.join("resources")).unwrap();
        std::fs::write(dir.join("resources").join(ENTRY_FILE), b"original").unwrap();
        dir
    }

    #[test]
    fn find_returns_only_valid_installs() {
        let tmp = tempfile::tempdir().unwrap();
        make_linux_install(tmp.path(), "discord");
        make_linux_install(tmp.path(), "discord-canary");
        // Missing entry archive
        std::fs::create_dir_all(tmp.path().join("discord-ptb").join("resources")).unwrap();
        // Not Discord at all
        make_linux_install(tmp.path(), "slack");

        let locator = InstallLocator::new(HostOs::Linux, vec![tmp.path().to_path_buf()]);
        let installs = locator.find();

        assert_eq!(installs.len(), 2);
        for install in &installs {
            let resources = install.primary_resources().unwrap();
            assert!(has_resource_layout(resources));
        }
        assert_eq!(installs[0].branch(), Branch::Stable);
        assert_eq!(installs[1].branch(), Branch::Canary);
    }

    #[test]
    fn find_tolerates_missing_roots() {
        let locator = InstallLocator::new(
            HostOs::Linux,
            vec![PathBuf::from("/definitely/not/a/real/root")],
        );
        assert!(locator.find().is_empty());
    }

    #[test]
    fn parse_discord_rejects_invalid_path() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = InstallLocator::new(HostOs::Linux, Vec::new());
        assert!(locator
            .parse_discord(&tmp.path().to_string_lossy(), None)
            .is_none());
        assert!(locator.parse_discord("", None).is_none());
        assert!(locator.parse_discord("/no/such/dir", None).is_none());
    }

    #[test]
    fn custom_path_without_marker_is_invalid_location() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = InstallLocator::new(HostOs::Linux, Vec::new());
        let err = locator
            .resolve_choice(InstallChoice::PendingCustomPath(
                tmp.path().to_string_lossy().to_string(),
            ))
            .unwrap_err();
        assert!(matches!(err, InstallerError::InvalidLocation(_)));
    }

    #[test]
    fn custom_path_uses_hint() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = make_linux_install(tmp.path(), "my-client");
        let locator = InstallLocator::new(HostOs::Linux, Vec::new());
        let install = locator
            .parse_discord(&dir.to_string_lossy(), Some(Branch::Ptb))
            .unwrap();
        assert_eq!(install.branch(), Branch::Ptb);
        assert!(!install.is_patched());
    }

    #[test]
    fn windows_layout_orders_versions_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("DiscordCanary");
        for version in ["app-1.0.9", "app-1.0.10"] {
            let resources = base.join(version).join("resources");
            std::fs::create_dir_all(&resources).unwrap();
            std::fs::write(resources.join(ENTRY_FILE), b"x").unwrap();
        }
        std::fs::create_dir_all(base.join("packages")).unwrap();

        let locator = InstallLocator::new(HostOs::Windows, vec![tmp.path().to_path_buf()]);
        let installs = locator.find();
        assert_eq!(installs.len(), 1);
        assert_eq!(installs[0].branch(), Branch::Canary);
        assert_eq!(installs[0].resource_dirs().len(), 2);
        assert!(installs[0]
            .primary_resources()
            .unwrap()
            .to_string_lossy()
            .contains("app-1.0.10"));
    }

    #[test]
    fn mac_requires_app_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let bundle = tmp.path().join("Discord Canary.app");
        let resources = bundle.join("Contents").join("Resources");
        std::fs::create_dir_all(&resources).unwrap();
        std::fs::write(resources.join(ENTRY_FILE), b"x").unwrap();

        let locator = InstallLocator::new(HostOs::MacOs, vec![tmp.path().to_path_buf()]);
        let installs = locator.find();
        assert_eq!(installs.len(), 1);
        assert_eq!(installs[0].branch(), Branch::Canary);

        let plain = make_linux_install(tmp.path(), "DiscordFolder");
        assert!(locator.parse(&plain, None).is_none());
    }
}
