pub mod locator;
pub mod model;

pub use locator::{has_resource_layout, InstallLocator};
pub use model::{Branch, Install, InstallChoice, BACKUP_FILE, ENTRY_FILE};
