//! Renderer error types.

use present_rhi::RhiError;
use thiserror::Error;

/// Errors surfaced by the frame driver.
#[derive(Error, Debug)]
pub enum RendererError {
    /// Presentation, attachment or device error.
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] present_core::Error),

    /// Frame methods called out of order.
    #[error("Invalid frame state: {0}")]
    InvalidState(String),
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = std::result::Result<T, RendererError>;
