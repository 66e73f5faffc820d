//! Core utilities for the presentation layer.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Configuration loading (TOML)

mod config;
mod error;
mod logging;

pub use config::{Config, PresentModeSetting, PresentationConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
