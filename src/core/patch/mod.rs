pub mod asar;
pub mod engine;
pub mod guard;
pub mod open_asar;
pub mod scuffed;
pub mod staging;

pub use engine::{PatchEngine, UnpatchOutcome};
pub use open_asar::{Consent, OpenAsarArchive, OPEN_ASAR_URL};
pub use scuffed::ScuffedDetector;
