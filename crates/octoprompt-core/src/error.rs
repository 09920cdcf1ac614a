//! Common error type for the Octoprompt crates.

use thiserror::Error;

/// Errors surfaced by the core, scheduler, and gateway crates.
#[derive(Debug, Error)]
pub enum OctopromptError {
    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// An operation referenced a schedule id that does not exist.
    #[error("schedule '{0}' not found")]
    ScheduleNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OctopromptError>;
