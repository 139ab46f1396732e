// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section is optional. Missing keys fall back to the defaults below,
// which reproduce the resizable HelloTriangle window.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// `false` gives the fixed-size variant (no user resizing)
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "HelloTriangle".to_string(),
            width: 600,
            height: 400,
            resizable: true,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "auto".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "debug".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a specific path. A missing file is not an
    /// error and yields the defaults.
    ///
    /// Runs before logging is initialized, so it reports nothing itself.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Preferred present mode, or `None` to let the swapchain pick.
    pub fn present_mode_preference(&self) -> Option<ash::vk::PresentModeKHR> {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "auto" => None,
            "immediate" => Some(ash::vk::PresentModeKHR::IMMEDIATE),
            "mailbox" => Some(ash::vk::PresentModeKHR::MAILBOX),
            "fifo" => Some(ash::vk::PresentModeKHR::FIFO),
            "fifo_relaxed" => Some(ash::vk::PresentModeKHR::FIFO_RELAXED),
            _ => {
                log::warn!(
                    "Unknown present mode '{}', choosing automatically",
                    self.graphics.present_mode
                );
                None
            }
        }
    }

    /// Configured log level; `None` when the string is not a level name
    pub fn log_filter(&self) -> Option<log::LevelFilter> {
        self.debug.log_level.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.title, "HelloTriangle");
        assert_eq!((config.window.width, config.window.height), (600, 400));
        assert!(config.window.resizable);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert!(config.debug.validation_layers);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::parse(
            r#"
            [window]
            width = 400
            height = 400
            resizable = false

            [graphics]
            present_mode = "FIFO"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "HelloTriangle");
        assert_eq!((config.window.width, config.window.height), (400, 400));
        assert!(!config.window.resizable);
        assert_eq!(config.present_mode_preference(), Some(vk::PresentModeKHR::FIFO));
        assert_eq!(config.debug.log_level, "debug");
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Config::parse("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_path("does/not/exist/config.toml").unwrap();
        assert_eq!(config.graphics.present_mode, "auto");
    }

    #[test]
    fn present_mode_strings() {
        let mut config = Config::default();
        assert_eq!(config.present_mode_preference(), None);

        config.graphics.present_mode = "mailbox".into();
        assert_eq!(config.present_mode_preference(), Some(vk::PresentModeKHR::MAILBOX));

        config.graphics.present_mode = "fifo_relaxed".into();
        assert_eq!(
            config.present_mode_preference(),
            Some(vk::PresentModeKHR::FIFO_RELAXED)
        );

        config.graphics.present_mode = "vsync-please".into();
        assert_eq!(config.present_mode_preference(), None);
    }

    #[test]
    fn log_level_names() {
        let mut config = Config::default();
        config.debug.log_level = "warn".into();
        assert_eq!(config.log_filter(), Some(log::LevelFilter::Warn));

        config.debug.log_level = "chatty".into();
        assert_eq!(config.log_filter(), None);
    }
}
