// ─── Vencord Installer Core ───
// Finds Discord installs, patches and unpatches them, keeps the cached build
// current and updates the installer itself.
//
// Architecture:
//   core/
//     platform/   — Host environment snapshot, cache dir and install roots
//     install/    — Install model + locator
//     patch/      — ASAR stubs, staged writes, patch engine, OpenAsar
//     build/      — Remote build manifest + cache provisioning
//     update/     — Installer self-update
//     downloader/ — Streaming downloads with SHA-256 validation
//     state/      — Per-run state, session and settings

pub mod build;
pub mod downloader;
pub mod error;
pub mod github;
pub mod http;
pub mod install;
pub mod patch;
pub mod platform;
pub mod state;
pub mod update;
