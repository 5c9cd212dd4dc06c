// src/error.rs

//! Crate-wide error type and result alias

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised during a conversion run
#[derive(Debug, Error)]
pub enum Error {
    /// A package identity string does not match any accepted grammar form,
    /// or one of its parsed fields fails validation. The message names every
    /// offending field.
    #[error("Malformed package identity: {0}")]
    MalformedIdentity(String),

    /// Two package identities cannot be ordered against each other
    /// (different names, or different architectures when both are set).
    #[error("Packages cannot be compared: {0}")]
    IncomparablePackages(String),

    /// An external command exited non-zero in a context where the caller
    /// could not classify the failure as ignorable. Carries the captured
    /// combined output and the exit code.
    #[error("Command '{command}' failed with exit code {code}:\n{output}")]
    CommandFailed {
        command: String,
        code: i32,
        output: String,
    },

    /// A conversion-ending condition. Continuing would leave the system
    /// inconsistent or unbootable; the driver aborts the whole run.
    #[error("{0}")]
    Fatal(String),

    /// Another instance of the tool owns the application lock.
    #[error("Another instance is already running (lock file: {0})")]
    AlreadyRunning(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// True for errors that must abort the whole conversion.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_) | Error::AlreadyRunning(_))
    }
}
