//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },
    /// The file is not JSON, or its values do not fit [`TransportSettings`](crate::TransportSettings).
    #[error("bad settings in {}: {source}", path.display())]
    Json {
        /// File the values came from.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: serde_json::Error,
    },
    /// A setting holds a value the transport cannot run with.
    #[error("{key}: {reason}")]
    InvalidValue {
        /// Offending settings key, as spelled in the file.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
