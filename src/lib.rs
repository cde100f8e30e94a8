pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::error::{ErrorKind, InstallerError, InstallerResult, UserMessage};
pub use crate::core::state::{InstallerState, SessionState, StartupChecks};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vencord_installer=debug")),
        )
        .try_init();

    tracing::info!(
        "Vencord Installer {} ({}) starting...",
        env!("INSTALLER_TAG"),
        env!("INSTALLER_GIT_HASH")
    );
}
