//! TOML configuration
//!
//! Every section and field is optional; missing values fall back to the
//! built-in defaults.
//!
//! ```toml
//! [defaults]
//! font = "Fira Code"
//! size = 10
//! width = 30
//!
//! [render]
//! dpi = 300
//! color = "#FF0000"
//! error_font_size = 8
//!
//! [session]
//! undo_capacity = 20
//! sidecar_extension = "mlat"
//!
//! [export]
//! suffix = "_marked"
//! grouped_dir = "marked"
//! ```

use crate::error::MarkError;
use crate::marks::MarkDefaults;
use crate::raster::RenderOptions;
use crate::sidecar::DEFAULT_SIDECAR_EXTENSION;
use crate::undo::DEFAULT_UNDO_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkConfig {
    /// Style for new marks and for sidecar entries missing one
    #[serde(default)]
    pub defaults: MarkDefaults,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl MarkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MarkError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            MarkError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        content.parse()
    }
}

impl FromStr for MarkConfig {
    type Err = MarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(|e| MarkError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Raster resolution for mark images (default: 300)
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Ink color as `#RRGGBB` (default: red)
    #[serde(default = "default_color")]
    pub color: String,
    /// Point size of the missing-font placeholder (default: 8)
    #[serde(default = "default_error_font_size")]
    pub error_font_size: u32,
}

fn default_dpi() -> u32 {
    300
}

fn default_color() -> String {
    "#FF0000".to_string()
}

fn default_error_font_size() -> u32 {
    8
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            color: default_color(),
            error_font_size: default_error_font_size(),
        }
    }
}

impl RenderConfig {
    pub fn to_options(&self) -> Result<RenderOptions, MarkError> {
        if self.dpi == 0 {
            return Err(MarkError::Config("dpi must be positive".to_string()));
        }
        Ok(RenderOptions {
            dpi: self.dpi as f32,
            color: parse_hex_color(&self.color)?,
            error_font_size: self.error_font_size as f32,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_undo_capacity")]
    pub undo_capacity: usize,
    #[serde(default = "default_sidecar_extension")]
    pub sidecar_extension: String,
}

fn default_undo_capacity() -> usize {
    DEFAULT_UNDO_CAPACITY
}

fn default_sidecar_extension() -> String {
    DEFAULT_SIDECAR_EXTENSION.to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            undo_capacity: default_undo_capacity(),
            sidecar_extension: default_sidecar_extension(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Appended to the source base name (default: `_marked`)
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Top-level directory of a grouped batch export (default: `marked`)
    #[serde(default = "default_grouped_dir")]
    pub grouped_dir: String,
}

fn default_suffix() -> String {
    "_marked".to_string()
}

fn default_grouped_dir() -> String {
    "marked".to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            suffix: default_suffix(),
            grouped_dir: default_grouped_dir(),
        }
    }
}

/// Parse `#RRGGBB` (the `#` is optional).
pub fn parse_hex_color(color: &str) -> Result<[u8; 3], MarkError> {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(MarkError::Config(format!("Invalid color: {}", color)));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| MarkError::Config(format!("Invalid color: {}", color)))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}
