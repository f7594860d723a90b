//! Command line arguments layered over the TOML configuration.

use std::path::PathBuf;

use clap::Parser;
use vkpbr_core::RenderConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Render a glTF model with Vulkan", long_about = None)]
pub struct Args {
    /// TOML file with renderer options; missing keys use defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// glTF or GLB model to display. Without one only the clear color is drawn.
    #[arg(long)]
    pub model: Option<PathBuf>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    /// Prefer a low-latency present mode over FIFO.
    #[arg(long)]
    pub no_vsync: bool,

    /// Frames the CPU may record ahead of the GPU.
    #[arg(long)]
    pub render_ahead: Option<u32>,

    /// Enable the Khronos validation layer.
    #[arg(long)]
    pub validation: bool,

    /// Directory holding the compiled `pbr.vert.spv` and `pbr.frag.spv`.
    #[arg(long, default_value = "shaders")]
    pub shaders: PathBuf,

    /// tracing filter directives, overriding RUST_LOG.
    #[arg(long)]
    pub log: Option<String>,
}

impl Args {
    /// Load the config file if given, then apply command line overrides.
    pub fn render_config(&self) -> vkpbr_core::Result<RenderConfig> {
        let base = match &self.config {
            Some(path) => RenderConfig::load(path)?,
            None => RenderConfig::default(),
        };
        let config = self.overlay(base);
        config.validate()?;
        Ok(config)
    }

    fn overlay(&self, mut config: RenderConfig) -> RenderConfig {
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(render_ahead) = self.render_ahead {
            config.render_ahead = render_ahead;
        }
        if self.no_vsync {
            config.vsync = false;
        }
        if self.validation {
            config.validation = true;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("vkpbr").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_flags_keep_file_values() {
        let file = RenderConfig::from_toml_str("width = 640\nvsync = false").unwrap();
        let config = parse(&[]).overlay(file.clone());
        assert_eq!(config, file);
    }

    #[test]
    fn flags_override_file_values() {
        let file = RenderConfig::from_toml_str("width = 640\nheight = 480\nrender_ahead = 3").unwrap();
        let config = parse(&["--width", "1920", "--render-ahead", "1", "--no-vsync"]).overlay(file);
        assert_eq!(config.width, 1920);
        assert_eq!(config.height, 480);
        assert_eq!(config.render_ahead, 1);
        assert!(!config.vsync);
    }

    #[test]
    fn zero_render_ahead_from_cli_is_rejected() {
        assert!(parse(&["--render-ahead", "0"]).render_config().is_err());
    }

    #[test]
    fn shader_dir_defaults_to_shaders() {
        assert_eq!(parse(&[]).shaders, PathBuf::from("shaders"));
    }
}
