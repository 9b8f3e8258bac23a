//! Error types for the monitor.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.

/// Errors that can occur while loading, mutating or watching DHCP state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system I/O error (path unreadable or unwritable).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config or vendor database).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A source could not be interpreted at all.
    ///
    /// Single malformed lines never produce this; they are skipped. It is
    /// returned only when nothing usable remains, e.g. a vendor database in
    /// which no line is a valid record.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A static entry failed field-level rules and was not applied.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A static entry would duplicate the MAC or IP of an enabled entry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No static entry exists with the given identifier.
    #[error("entry with ID {0} not found")]
    NotFound(String),

    /// Invalid process configuration.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The file watcher could not be created or attached.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// A specialized Result type for monitor operations.
pub type Result<T> = std::result::Result<T, Error>;
