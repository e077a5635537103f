//! Error types for the scanner tools.
//!
//! Decoding itself never fails; these cover configuration and input I/O.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Failed to set up logging: {0}")]
    Logging(String),

    #[cfg(unix)]
    #[error("PTY error: {0}")]
    Pty(#[source] nix::Error),

    #[error("Child process killed by signal: {0}")]
    ChildSignaled(i32),
}

/// Result type for scanner tool operations
pub type ScanResult<T> = Result<T, ScanError>;
