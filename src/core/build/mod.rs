pub mod manifest;
pub mod provisioner;

pub use manifest::{BuildManifest, BuildStatus, ManifestAsset, RemoteBuild, PATCHER_FILE};
pub use provisioner::{BuildProvisioner, BuildSource, GithubBuildSource, VerifiedBuild};
