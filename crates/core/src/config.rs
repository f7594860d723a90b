//! Renderer configuration loaded from TOML.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};

/// Options recognized by the renderer.
///
/// Every field is optional in the file; missing keys take the values from
/// [`RenderConfig::default`]. `render_ahead` sizes the frame slot array and is
/// only read at construction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Request a FIFO present mode.
    pub vsync: bool,
    pub multi_sampling: bool,
    /// Requested MSAA sample count; clamped to what the device supports.
    pub sample_count: u32,
    /// Number of frames the CPU may record ahead of the GPU.
    pub render_ahead: u32,
    /// Enable the Khronos validation layer when available.
    pub validation: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            vsync: true,
            multi_sampling: true,
            sample_count: 4,
            render_ahead: 2,
            validation: cfg!(debug_assertions),
        }
    }
}

impl RenderConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "Loaded render config");
        Ok(config)
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the renderer cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.render_ahead == 0 {
            return Err(Error::Config("render_ahead must be at least 1".into()));
        }
        if !self.sample_count.is_power_of_two() || self.sample_count > 64 {
            return Err(Error::Config(format!(
                "sample_count must be a power of two in 1..=64, got {}",
                self.sample_count
            )));
        }
        Ok(())
    }

    /// Sample count actually requested from the device.
    pub fn requested_samples(&self) -> u32 {
        if self.multi_sampling {
            self.sample_count
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = RenderConfig::from_toml_str("").unwrap();
        assert_eq!(config, RenderConfig::default());
        assert_eq!(config.render_ahead, 2);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let config = RenderConfig::from_toml_str(
            r#"
            width = 800
            height = 600
            vsync = false
            render_ahead = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.width, 800);
        assert_eq!(config.height, 600);
        assert!(!config.vsync);
        assert_eq!(config.render_ahead, 3);
        assert_eq!(config.sample_count, 4);
    }

    #[test]
    fn zero_render_ahead_is_rejected() {
        let err = RenderConfig::from_toml_str("render_ahead = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn non_power_of_two_samples_are_rejected() {
        let err = RenderConfig::from_toml_str("sample_count = 3").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = RenderConfig::from_toml_str("frames_in_flight = 2").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn multisampling_off_requests_one_sample() {
        let config = RenderConfig {
            multi_sampling: false,
            ..RenderConfig::default()
        };
        assert_eq!(config.requested_samples(), 1);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = RenderConfig::load(Path::new("/nonexistent/vkpbr.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }
}
