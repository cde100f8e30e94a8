pub mod paths;

use std::path::PathBuf;

pub use paths::{install_roots, PlatformPaths};

pub const USER_DATA_DIR_ENV: &str = "VENCORD_USER_DATA_DIR";
pub const DISCORD_USER_DATA_DIR_ENV: &str = "DISCORD_USER_DATA_DIR";
pub const DEV_INSTALL_ENV: &str = "VENCORD_DEV_INSTALL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    MacOs,
    Linux,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(windows) {
            HostOs::Windows
        } else if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else {
            HostOs::Linux
        }
    }
}

/// Snapshot of everything the installer reads from the host environment.
///
/// Captured once at startup so path resolution stays a pure function of it.
#[derive(Debug, Clone)]
pub struct HostEnv {
    pub os: HostOs,
    pub home: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub local_app_data: Option<PathBuf>,
    pub program_data: Option<PathBuf>,
    pub username: Option<String>,
    pub user_data_dir: Option<PathBuf>,
    pub discord_user_data_dir: Option<PathBuf>,
    pub dev_install: bool,
    pub current_dir: PathBuf,
}

impl HostEnv {
    pub fn current() -> Self {
        let os = HostOs::current();
        let mut home = dirs::home_dir();
        let mut config_dir = dirs::config_dir();

        if os == HostOs::Linux {
            if let Some(sudo_home) = non_empty_env("SUDO_USER")
                .filter(|user| user != "root")
                .and_then(|user| sudo_user_home(&user))
            {
                tracing::debug!("Running through sudo, using home {:?}", sudo_home);
                config_dir = Some(sudo_home.join(".config"));
                home = Some(sudo_home);
            }
        }

        Self {
            os,
            home,
            config_dir,
            local_app_data: non_empty_env("LOCALAPPDATA")
                .map(PathBuf::from)
                .or_else(dirs::data_local_dir),
            program_data: non_empty_env("PROGRAMDATA").map(PathBuf::from),
            username: non_empty_env("USERNAME").or_else(|| non_empty_env("USER")),
            user_data_dir: non_empty_env(USER_DATA_DIR_ENV).map(PathBuf::from),
            discord_user_data_dir: non_empty_env(DISCORD_USER_DATA_DIR_ENV).map(PathBuf::from),
            dev_install: non_empty_env(DEV_INSTALL_ENV).as_deref() == Some("1"),
            current_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Looks up the home directory of `user` in `/etc/passwd`.
fn sudo_user_home(user: &str) -> Option<PathBuf> {
    let passwd = std::fs::read_to_string("/etc/passwd").ok()?;
    home_from_passwd(&passwd, user)
}

fn home_from_passwd(passwd: &str, user: &str) -> Option<PathBuf> {
    passwd.lines().find_map(|line| {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() >= 6 && fields[0] == user && !fields[5].is_empty() {
            Some(PathBuf::from(fields[5]))
        } else {
            None
        }
    })
}
