//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default edit canvas settings.
    #[serde(default)]
    pub canvas: CanvasDefaults,

    /// Default export settings.
    #[serde(default)]
    pub export: ExportDefaults,

    /// Font used to rasterize text elements.
    #[serde(default)]
    pub fonts: FontConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default edit canvas parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasDefaults {
    /// Edit canvas width in pixels.
    pub width: u32,

    /// Edit canvas height in pixels.
    pub height: u32,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Export width in pixels.
    pub width: u32,

    /// Export height in pixels.
    pub height: u32,

    /// Suggested output file name.
    pub file_name: String,

    /// Background color (any CSS color string).
    pub background: String,

    /// How percentages are stored when normalizing for export.
    pub precision: PercentPrecision,
}

/// Precision used when converting pixel geometry to percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PercentPrecision {
    /// Keep the full fractional percentage.
    #[default]
    Exact,
    /// Truncate each percentage to a whole number.
    WholePercent,
}

/// Font configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FontConfig {
    /// Path to a TTF/OTF font used for text elements.
    /// Text is skipped during rasterization when unset.
    pub text_font: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vellum=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasDefaults::default(),
            export: ExportDefaults::default(),
            fonts: FontConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CanvasDefaults {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            width: 4000,
            height: 3000,
            file_name: "export.png".to_string(),
            background: "transparent".to_string(),
            precision: PercentPrecision::Exact,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("vellum").join("config.json")
}
