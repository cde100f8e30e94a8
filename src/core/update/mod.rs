pub mod release;
pub mod updater;

pub use release::{BuildIdentity, InstallerRelease};
pub use updater::{
    GithubReleaseSource, PendingRelaunch, ReleaseSource, ReleaseStatus, SelfUpdater,
    UpdateOutcome, UpdateTarget,
};
