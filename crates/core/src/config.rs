//! Configuration loading.
//!
//! The presentation layer reads an optional TOML file:
//!
//! ```toml
//! [presentation]
//! present_mode = "fifo"      # immediate | mailbox | fifo
//! require_stencil = true
//! width = 1280
//! height = 720
//! samples = 1               # MSAA sample count
//! ```
//!
//! Every key has a default, so an empty file (or no file at all) is valid.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Which presentation mode the swapchain should prefer.
///
/// FIFO is always the fallback when the preferred mode is not reported by
/// the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeSetting {
    /// No vsync, may tear, lowest latency.
    #[default]
    Immediate,
    /// Triple buffering without tearing.
    Mailbox,
    /// Strict vsync.
    Fifo,
}

/// `[presentation]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Preferred present mode.
    pub present_mode: PresentModeSetting,
    /// Whether the depth format must carry a stencil component.
    pub require_stencil: bool,
    /// Requested surface width in pixels (used when the surface extent is flexible).
    pub width: u32,
    /// Requested surface height in pixels.
    pub height: u32,
    /// MSAA sample count of the render targets. Above 1, rendering goes to a
    /// multisampled color image resolved into the presentable image.
    pub samples: u32,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            present_mode: PresentModeSetting::default(),
            require_stencil: true,
            width: 1280,
            height: 720,
            samples: 1,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Swapchain and depth settings.
    pub presentation: PresentationConfig,
}

impl Config {
    /// Parses configuration from TOML text and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigRead`] if the file cannot be read, or a parse /
    /// validation error for bad contents.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    ///
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Checks values the swapchain code would otherwise reject much later.
    pub fn validate(&self) -> Result<()> {
        let p = &self.presentation;
        if p.width == 0 || p.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "presentation extent must be non-zero (got {}x{})",
                p.width, p.height
            )));
        }
        if !p.samples.is_power_of_two() || p.samples > 64 {
            return Err(Error::InvalidConfig(format!(
                "samples must be a power of two in 1..=64 (got {})",
                p.samples
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(
            config.presentation.present_mode,
            PresentModeSetting::Immediate
        );
        assert!(config.presentation.require_stencil);
    }

    #[test]
    fn test_parse_presentation_table() {
        let config = Config::from_toml_str(
            r#"
            [presentation]
            present_mode = "fifo"
            require_stencil = false
            width = 800
            height = 600
            samples = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.presentation.present_mode, PresentModeSetting::Fifo);
        assert!(!config.presentation.require_stencil);
        assert_eq!(config.presentation.width, 800);
        assert_eq!(config.presentation.height, 600);
        assert_eq!(config.presentation.samples, 4);
    }

    #[test]
    fn test_partial_table_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [presentation]
            present_mode = "mailbox"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.presentation.present_mode,
            PresentModeSetting::Mailbox
        );
        assert_eq!(config.presentation.width, 1280);
        assert_eq!(config.presentation.height, 720);
    }

    #[test]
    fn test_unknown_present_mode_is_parse_error() {
        let result = Config::from_toml_str(
            r#"
            [presentation]
            present_mode = "adaptive"
            "#,
        );
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_zero_extent_rejected() {
        let result = Config::from_toml_str(
            r#"
            [presentation]
            width = 0
            "#,
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_sample_count_rejected() {
        for samples in [0, 3, 128] {
            let text = format!("[presentation]\nsamples = {samples}\n");
            assert!(
                matches!(Config::from_toml_str(&text), Err(Error::InvalidConfig(_))),
                "samples = {samples} should be rejected"
            );
        }
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("definitely/not/here/present.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let result = Config::load("definitely/not/here/present.toml");
        assert!(matches!(result, Err(Error::ConfigRead { .. })));
    }
}
