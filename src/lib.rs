//! natprobe - NAT behavior classifier
//!
//! This library determines how the local NAT maps and filters UDP traffic using
//! only unprivileged STUN probes against public servers. The result is a plain
//! [`nat::DetectionResult`] value that callers can display or persist.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod nat;

/// Result type alias for natprobe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for natprobe operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

/// Initialize the natprobe library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}

#[cfg(test)]
mod tests;
