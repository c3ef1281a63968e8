//! Conversion settings.
//!
//! A run is configured by one immutable [`ConversionSettings`] value. The
//! pipeline trusts it: range checks live here, in [`ConversionSettings::new`]
//! (rejects) and in the [`ConversionSettingsBuilder`] setters (clamp).

use crate::error::Pdf2ImgError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quality the builder substitutes for zero or negative input.
pub const MIN_QUALITY: f32 = 0.1;
/// Highest JPEG quality.
pub const MAX_QUALITY: f32 = 1.0;
/// Native page resolution (1 PDF point per pixel).
pub const MIN_SCALE: f32 = 1.0;
/// Three times native resolution (216 DPI).
pub const MAX_SCALE: f32 = 3.0;
/// PDF user-space units per inch.
pub const POINTS_PER_INCH: f32 = 72.0;

/// Encoded image format of each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless; `quality` is ignored. (default)
    #[default]
    Png,
    /// Lossy; compressed with `quality`.
    Jpeg,
}

impl OutputFormat {
    /// File extension used by the save and archive helpers.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn is_lossy(self) -> bool {
        matches!(self, OutputFormat::Jpeg)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
        })
    }
}

impl FromStr for OutputFormat {
    type Err = Pdf2ImgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            other => Err(Pdf2ImgError::InvalidSettings(format!(
                "unknown format '{other}' (expected png or jpeg)"
            ))),
        }
    }
}

/// Settings for one conversion run.
///
/// # Example
/// ```rust
/// use edgequake_pdf2img::{ConversionSettings, OutputFormat};
///
/// let settings = ConversionSettings::builder()
///     .format(OutputFormat::Jpeg)
///     .quality(0.8)
///     .scale(1.5)
///     .build()
///     .unwrap();
/// assert_eq!(settings.dpi(), 108);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConversionSettings {
    /// Output format. Default: PNG.
    pub format: OutputFormat,
    /// JPEG quality in (0.0, 1.0]. Default: 0.92. Ignored for PNG.
    pub quality: f32,
    /// Linear resolution multiplier in [1.0, 3.0]. Default: 2.0 (144 DPI).
    pub scale: f32,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            quality: 0.92,
            scale: 2.0,
        }
    }
}

impl ConversionSettings {
    /// Validate and construct settings; out-of-range values are rejected.
    pub fn new(format: OutputFormat, quality: f32, scale: f32) -> Result<Self, Pdf2ImgError> {
        let settings = Self {
            format,
            quality,
            scale,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn builder() -> ConversionSettingsBuilder {
        ConversionSettingsBuilder {
            settings: Self::default(),
        }
    }

    /// Check the range invariants.
    pub fn validate(&self) -> Result<(), Pdf2ImgError> {
        if !(self.quality > 0.0 && self.quality <= MAX_QUALITY) {
            return Err(Pdf2ImgError::InvalidSettings(format!(
                "quality must be in (0, 1], got {}",
                self.quality
            )));
        }
        if !(MIN_SCALE..=MAX_SCALE).contains(&self.scale) {
            return Err(Pdf2ImgError::InvalidSettings(format!(
                "scale must be in [{MIN_SCALE}, {MAX_SCALE}], got {}",
                self.scale
            )));
        }
        Ok(())
    }

    /// Effective output resolution in dots per inch.
    pub fn dpi(&self) -> u32 {
        (self.scale * POINTS_PER_INCH).round() as u32
    }

    /// JPEG quality on the 1–100 scale used by encoders.
    pub fn quality_percent(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

/// Builder for [`ConversionSettings`]. Setters clamp into range.
#[derive(Debug)]
pub struct ConversionSettingsBuilder {
    settings: ConversionSettings,
}

impl ConversionSettingsBuilder {
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.settings.format = format;
        self
    }

    /// Values in (0, 1] are kept as given; larger values become 1.0 and
    /// zero or negative values become [`MIN_QUALITY`].
    pub fn quality(mut self, quality: f32) -> Self {
        self.settings.quality = if quality > MAX_QUALITY {
            MAX_QUALITY
        } else if quality <= 0.0 {
            MIN_QUALITY
        } else {
            quality
        };
        self
    }

    pub fn scale(mut self, scale: f32) -> Self {
        self.settings.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
        self
    }

    /// Set the scale from a DPI value (72 DPI = scale 1.0).
    pub fn dpi(self, dpi: u32) -> Self {
        self.scale(dpi as f32 / POINTS_PER_INCH)
    }

    /// Build the settings. Fails only for non-finite input (NaN survives clamping).
    pub fn build(self) -> Result<ConversionSettings, Pdf2ImgError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
