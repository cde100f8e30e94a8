pub mod app_state;
pub mod session;
pub mod settings;

pub use app_state::{InstallerState, OpenAsarToggle, StartupChecks};
pub use session::{PathAutocomplete, SessionState};
pub use settings::InstallerSettings;
