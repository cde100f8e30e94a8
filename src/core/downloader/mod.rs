pub mod client;
pub mod digest;

pub use client::Downloader;
pub use digest::{normalize_sha256, sha256_file, sha256_hex};
