//! Configuration structures for JPEG extraction.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::pdf::DEFAULT_MAX_FORM_DEPTH;

/// Main configuration for the pdfjpeg pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfJpegConfig {
    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// Output configuration.
    pub output: OutputConfig,
}

/// PDF processing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Password used when initializing an encrypted document.
    pub password: String,

    /// Maximum pages to scan (0 = unlimited).
    pub max_pages: usize,

    /// Maximum nesting of form XObjects the interpreter descends into.
    pub max_form_depth: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            max_pages: 0,
            max_form_depth: DEFAULT_MAX_FORM_DEPTH,
        }
    }
}

/// Output configuration for extracted images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File name prefix for written images.
    pub file_prefix: String,

    /// Overwrite existing files.
    pub overwrite: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file_prefix: "image-".to_string(),
            overwrite: false,
        }
    }
}

impl PdfJpegConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
