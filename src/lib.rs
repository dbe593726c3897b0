//! # LanSync
//!
//! Local-network discovery and sync orchestrator.
//!
//! LanSync announces this device as an mDNS service, browses for peers
//! announcing the same service type, keeps a registry of resolved peers and
//! checks liveness with a tiny HTTP handshake. All of it is driven by one
//! debounced event loop and one ordered side-effect loop.

pub mod cli;
pub mod config;
pub mod context;
pub mod discovery;
pub mod files;
pub mod handshake;
pub mod reducer;
pub mod sync;

pub use config::Config;
pub use context::AppContext;
pub use sync::{SyncEngine, SyncEvent, SyncSideEffect, SyncState};

/// Result type alias for LanSync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for LanSync operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Sandboxed file access error
    #[error("File error: {0}")]
    Files(#[from] files::FileError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Target triple stamped by build.rs
pub const TARGET: &str = env!("TARGET");
