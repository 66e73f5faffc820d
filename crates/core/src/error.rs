//! Error types shared by the presentation layer front-end.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for configuration and start-up.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be read.
    #[error("Failed to read config '{path}': {source}")]
    ConfigRead {
        /// Path of the file that failed to load.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration text is not valid TOML for [`Config`](crate::Config).
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration parsed but holds values the presentation layer cannot use.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;
