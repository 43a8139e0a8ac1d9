//! Nessus implementation of the scanning service

pub mod client;
pub mod pinning;
pub mod types;

pub use client::NessusClient;
pub use pinning::{spki_fingerprint, PinnedKeys};
