use iced::theme::Palette;
use iced::{Color, Theme};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeChoice {
    Light,
    Dark,
    FusionDark,
    #[default]
    EnhancedDark,
    EnhancedLight,
    Professional,
    Creative,
}

impl ThemeChoice {
    pub const ALL: [ThemeChoice; 7] = [
        ThemeChoice::Light,
        ThemeChoice::Dark,
        ThemeChoice::FusionDark,
        ThemeChoice::EnhancedDark,
        ThemeChoice::EnhancedLight,
        ThemeChoice::Professional,
        ThemeChoice::Creative,
    ];

    pub fn theme(&self) -> Theme {
        match self.palette() {
            Some(palette) => Theme::custom(palette),
            None if *self == Self::Light => Theme::Light,
            None => Theme::Dark,
        }
    }

    /// Custom palette, or None for the toolkit's stock themes.
    pub fn palette(&self) -> Option<Palette> {
        let (background, text, primary) = match self {
            Self::Light | Self::Dark => return None,
            Self::FusionDark => (0x2b2b2b, 0xffffff, 0x3daee9),
            Self::EnhancedDark => (0x1e1e1e, 0xffffff, 0x0078d4),
            Self::EnhancedLight => (0xf7fafc, 0x2d3748, 0x3182ce),
            Self::Professional => (0x1a202c, 0xe2e8f0, 0x4299e1),
            Self::Creative => (0x1a1a2e, 0xeeeeee, 0x667eea),
        };

        Some(Palette {
            background: hex(background),
            text: hex(text),
            primary: hex(primary),
            success: hex(0x4caf50),
            danger: hex(0xe53e3e),
        })
    }
}

impl std::fmt::Display for ThemeChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "Light"),
            Self::Dark => write!(f, "Dark"),
            Self::FusionDark => write!(f, "Fusion Dark"),
            Self::EnhancedDark => write!(f, "Enhanced Dark"),
            Self::EnhancedLight => write!(f, "Enhanced Light"),
            Self::Professional => write!(f, "Professional"),
            Self::Creative => write!(f, "Creative"),
        }
    }
}

fn hex(rgb: u32) -> Color {
    Color::from_rgb8((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_themes_have_no_palette() {
        assert!(ThemeChoice::Light.palette().is_none());
        assert!(ThemeChoice::Dark.palette().is_none());
        assert!(matches!(ThemeChoice::Light.theme(), Theme::Light));
    }

    #[test]
    fn custom_palettes_decode_hex() {
        let palette = ThemeChoice::EnhancedDark.palette().unwrap();
        assert_eq!(palette.primary, Color::from_rgb8(0x00, 0x78, 0xd4));
        assert_eq!(palette.background, Color::from_rgb8(0x1e, 0x1e, 0x1e));
    }

    #[test]
    fn every_choice_has_a_distinct_label() {
        let labels: std::collections::HashSet<String> =
            ThemeChoice::ALL.iter().map(|t| t.to_string()).collect();
        assert_eq!(labels.len(), ThemeChoice::ALL.len());
    }
}
