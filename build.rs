use std::process::Command;

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if hash.is_empty() {
        None
    } else {
        Some(hash)
    }
}

fn main() {
    println!("cargo:rerun-if-env-changed=INSTALLER_GIT_HASH");
    println!("cargo:rerun-if-env-changed=INSTALLER_TAG");
    println!("cargo:rerun-if-changed=.git/HEAD");

    if std::env::var("INSTALLER_GIT_HASH").is_err() {
        let hash = git_short_hash().unwrap_or_else(|| "unknown".to_string());
        println!("cargo:rustc-env=INSTALLER_GIT_HASH={hash}");
    }

    if std::env::var("INSTALLER_TAG").is_err() {
        let version = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".into());
        println!("cargo:rustc-env=INSTALLER_TAG=v{version}");
    }
}
