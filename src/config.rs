//! Configuration for imgpress

use serde::{Deserialize, Serialize};

use crate::deflate::DeflateOptions;
use crate::error::{CompressError, Result};
use crate::jpeg_lite::JpegLiteOptions;
use crate::lz77::{MAX_LEVEL, MAX_WINDOW_SIZE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// LZ77 sliding window in bytes, 1..=32768.
    pub window_size: usize,
    /// Deflate level 0..=9. 0 stores, 9 searches the whole window.
    pub level: u8,
    /// JPEG-lite quality used when a call does not pass one.
    pub default_quality: u8,
    /// Convert RGB(A) to YCbCr before the DCT stage.
    pub color_transform: bool,
    /// Resample images to `[width, height]` before lossy coding; `None`
    /// keeps the original dimensions.
    pub target_dimensions: Option<(u32, u32)>,
    pub max_input_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            window_size: MAX_WINDOW_SIZE,
            level: MAX_LEVEL,
            default_quality: 80,
            color_transform: true,
            target_dimensions: None,
            max_input_size: 100 * 1024 * 1024, // 100 MB
        }
    }
}

impl CompressionConfig {
    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CompressError::SerializationError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CompressError::SerializationError(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.window_size > MAX_WINDOW_SIZE {
            return Err(CompressError::InvalidParameter(format!(
                "window_size {} outside 1..={MAX_WINDOW_SIZE}",
                self.window_size
            )));
        }
        if self.level > MAX_LEVEL {
            return Err(CompressError::InvalidParameter(format!(
                "level {} outside 0..={MAX_LEVEL}",
                self.level
            )));
        }
        if self.default_quality > 100 {
            return Err(CompressError::InvalidParameter(format!(
                "default_quality {} outside 0..=100",
                self.default_quality
            )));
        }
        if let Some((width, height)) = self.target_dimensions {
            if width == 0 || height == 0 {
                return Err(CompressError::InvalidParameter(format!(
                    "target_dimensions {width}x{height} has zero area"
                )));
            }
        }
        Ok(())
    }

    pub fn deflate_options(&self) -> DeflateOptions {
        DeflateOptions {
            window_size: self.window_size,
            level: self.level,
        }
    }

    pub fn jpeg_lite_options(&self) -> JpegLiteOptions {
        JpegLiteOptions {
            color_transform: self.color_transform,
            target: self.target_dimensions,
        }
    }
}
