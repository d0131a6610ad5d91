//! Engine configuration.
//!
//! Settings are read from a TOML file; every field is optional and falls back
//! to the defaults below.
//!
//! ```toml
//! width = 1280
//! height = 720
//! render_api = "vulkan"
//! triple_buffering = true
//! shader_dir = "shaders"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Graphics API requested by the configuration.
///
/// Only Vulkan is implemented. Other values are accepted so that existing
/// configuration files keep parsing, and the engine falls back to Vulkan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderApi {
    #[default]
    Vulkan,
    DirectX12,
}

impl std::fmt::Display for RenderApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderApi::Vulkan => write!(f, "Vulkan"),
            RenderApi::DirectX12 => write!(f, "DirectX 12"),
        }
    }
}

/// Top-level engine settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Window width in pixels.
    pub width: u32,
    /// Window height in pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
    /// Requested rendering backend.
    pub render_api: RenderApi,
    /// Keep three frames in flight instead of two.
    pub triple_buffering: bool,
    /// Enable Vulkan validation layers.
    pub validation: bool,
    /// Directory holding compiled SPIR-V shaders.
    pub shader_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Baldwin Engine".to_string(),
            render_api: RenderApi::Vulkan,
            triple_buffering: false,
            validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

impl EngineConfig {
    /// Number of frame slots the renderer keeps in flight.
    pub fn frame_overlap(&self) -> usize {
        if self.triple_buffering { 3 } else { 2 }
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if it does not parse or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads a configuration file, using defaults when it does not exist.
    ///
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Checks values that would make the renderer fail later on.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "window extent must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_window() {
        let config = EngineConfig::default();
        assert_eq!(config.width, 800);
        assert_eq!(config.height, 600);
        assert_eq!(config.render_api, RenderApi::Vulkan);
        assert_eq!(config.frame_overlap(), 2);
    }

    #[test]
    fn test_triple_buffering_overlap() {
        let config = EngineConfig {
            triple_buffering: true,
            ..Default::default()
        };
        assert_eq!(config.frame_overlap(), 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml("width = 1024\nrender_api = \"directx12\"").unwrap();
        assert_eq!(config.width, 1024);
        assert_eq!(config.height, 600);
        assert_eq!(config.render_api, RenderApi::DirectX12);
        assert_eq!(config.shader_dir, PathBuf::from("shaders"));
    }

    #[test]
    fn test_zero_extent_rejected() {
        let err = EngineConfig::from_toml("height = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(matches!(
            EngineConfig::from_toml("width = \"wide\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load_or_default("definitely/not/here.toml").unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
