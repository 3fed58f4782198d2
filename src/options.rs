// options.rs - Processing options shared by the GUI, the batch runner and the settings file

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_QUALITY: u8 = 10;
pub const MAX_QUALITY: u8 = 100;
pub const DEFAULT_QUALITY: u8 = 85;
pub const MAX_PERCENTAGE: u32 = 200;

/// How the output dimensions are derived from the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ResizeMode {
    #[default]
    None,
    Percentage { percent: u32 },
    FixedSize { width: u32, height: u32 },
    MaxWidth { width: u32 },
}

/// Resize method as shown in the picker, without its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMethod {
    #[default]
    None,
    Percentage,
    FixedSize,
    MaxWidth,
}

impl ResizeMethod {
    pub const ALL: [ResizeMethod; 4] = [
        ResizeMethod::None,
        ResizeMethod::Percentage,
        ResizeMethod::FixedSize,
        ResizeMethod::MaxWidth,
    ];
}

impl std::fmt::Display for ResizeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "No Resizing"),
            Self::Percentage => write!(f, "Percentage"),
            Self::FixedSize => write!(f, "Fixed Size"),
            Self::MaxWidth => write!(f, "Max Width"),
        }
    }
}

impl ResizeMode {
    pub fn method(&self) -> ResizeMethod {
        match self {
            Self::None => ResizeMethod::None,
            Self::Percentage { .. } => ResizeMethod::Percentage,
            Self::FixedSize { .. } => ResizeMethod::FixedSize,
            Self::MaxWidth { .. } => ResizeMethod::MaxWidth,
        }
    }

    /// Output size for an image of `width` x `height`.
    ///
    /// When enlarging is not allowed and either dimension would grow, the
    /// original size is kept as a whole. Results never drop below 1px.
    pub fn target_dimensions(&self, width: u32, height: u32, allow_enlarge: bool) -> (u32, u32) {
        let (new_width, new_height) = match *self {
            Self::None => (width, height),
            Self::Percentage { percent } => (
                scale(width, percent, 100),
                scale(height, percent, 100),
            ),
            Self::FixedSize { width: w, height: h } => (w, h),
            Self::MaxWidth { width: max_width } => {
                if width > max_width {
                    (max_width, scale(height, max_width, width))
                } else {
                    (width, height)
                }
            }
        };

        if !allow_enlarge && (new_width > width || new_height > height) {
            return (width, height);
        }

        (new_width.max(1), new_height.max(1))
    }
}

fn scale(value: u32, numerator: u32, denominator: u32) -> u32 {
    (value as u64 * numerator as u64 / denominator.max(1) as u64).min(u32::MAX as u64) as u32
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("Quality must be between 10 and 100, got {0}")]
    Quality(u8),
    #[error("Percentage must be between 1 and 200, got {0}")]
    Percentage(u32),
    #[error("Width and height must be at least 1px")]
    ZeroDimension,
    #[error("Select at least one output format")]
    NoOutputFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessOptions {
    pub quality: u8,
    pub to_jpg: bool,
    pub to_webp: bool,
    pub preserve_exif: bool,
    pub allow_enlarge: bool,
    pub preserve_transparency: bool,
    pub grayscale: bool,
    pub sharpen: bool,
    pub rename_prefix: String,
    pub resize: ResizeMode,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            to_jpg: true,
            to_webp: true,
            preserve_exif: true,
            allow_enlarge: false,
            preserve_transparency: true,
            grayscale: false,
            sharpen: false,
            rename_prefix: String::new(),
            resize: ResizeMode::None,
        }
    }
}

impl ProcessOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&self.quality) {
            return Err(OptionsError::Quality(self.quality));
        }

        match self.resize {
            ResizeMode::Percentage { percent } if !(1..=MAX_PERCENTAGE).contains(&percent) => {
                return Err(OptionsError::Percentage(percent));
            }
            ResizeMode::FixedSize { width, height } if width == 0 || height == 0 => {
                return Err(OptionsError::ZeroDimension);
            }
            ResizeMode::MaxWidth { width: 0 } => return Err(OptionsError::ZeroDimension),
            _ => {}
        }

        if !self.to_jpg && !self.to_webp {
            return Err(OptionsError::NoOutputFormat);
        }

        Ok(())
    }

    /// File stem for outputs of `stem`, with the rename prefix applied.
    pub fn output_stem(&self, stem: &str) -> String {
        let prefix = self.rename_prefix.trim();
        if prefix.is_empty() {
            stem.to_string()
        } else {
            format!("{}_{}", prefix, stem)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_scales_both_dimensions() {
        let mode = ResizeMode::Percentage { percent: 50 };
        assert_eq!(mode.target_dimensions(801, 600, false), (400, 300));
    }

    #[test]
    fn percentage_above_hundred_needs_enlarge() {
        let mode = ResizeMode::Percentage { percent: 150 };
        assert_eq!(mode.target_dimensions(100, 80, false), (100, 80));
        assert_eq!(mode.target_dimensions(100, 80, true), (150, 120));
    }

    #[test]
    fn max_width_preserves_aspect_ratio() {
        let mode = ResizeMode::MaxWidth { width: 1000 };
        assert_eq!(mode.target_dimensions(4000, 3000, false), (1000, 750));
        // Narrower images are left alone, even with enlarging allowed
        assert_eq!(mode.target_dimensions(640, 480, true), (640, 480));
    }

    #[test]
    fn fixed_size_clamps_when_any_side_grows() {
        let mode = ResizeMode::FixedSize { width: 50, height: 500 };
        assert_eq!(mode.target_dimensions(100, 100, false), (100, 100));
        assert_eq!(mode.target_dimensions(100, 100, true), (50, 500));

        let shrink = ResizeMode::FixedSize { width: 40, height: 30 };
        assert_eq!(shrink.target_dimensions(100, 100, false), (40, 30));
    }

    #[test]
    fn tiny_images_never_reach_zero() {
        let mode = ResizeMode::Percentage { percent: 1 };
        assert_eq!(mode.target_dimensions(10, 10, false), (1, 1));
    }

    #[test]
    fn validate_rejects_bad_options() {
        let mut options = ProcessOptions::default();
        assert!(options.validate().is_ok());

        options.quality = 5;
        assert_eq!(options.validate(), Err(OptionsError::Quality(5)));

        options.quality = 85;
        options.resize = ResizeMode::Percentage { percent: 0 };
        assert_eq!(options.validate(), Err(OptionsError::Percentage(0)));

        options.resize = ResizeMode::FixedSize { width: 0, height: 10 };
        assert_eq!(options.validate(), Err(OptionsError::ZeroDimension));

        options.resize = ResizeMode::None;
        options.to_jpg = false;
        options.to_webp = false;
        assert_eq!(options.validate(), Err(OptionsError::NoOutputFormat));
    }

    #[test]
    fn output_stem_applies_prefix() {
        let mut options = ProcessOptions::default();
        assert_eq!(options.output_stem("photo"), "photo");

        options.rename_prefix = "web ".to_string();
        assert_eq!(options.output_stem("photo"), "web_photo");
    }
}
