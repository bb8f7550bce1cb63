//! Page geometry and themes for Markdown → PDF rendering.

use super::metrics::{Family, Font};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A4 in PDF points.
pub const A4_WIDTH: f32 = 595.28;
pub const A4_HEIGHT: f32 = 841.89;

/// Built-in visual themes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Sans-serif body, ruled h1/h2, tinted code blocks.
    #[default]
    Github,
    /// Serif body, centred title.
    Academic,
    /// Sans-serif, compact headings, no rules.
    Minimal,
}

impl Theme {
    pub fn body_family(self) -> Family {
        match self {
            Theme::Academic => Family::Serif,
            Theme::Github | Theme::Minimal => Family::Sans,
        }
    }

    /// Heading size as a multiple of the body size.
    pub fn heading_scale(self, level: u8) -> f32 {
        let scales: [f32; 6] = match self {
            Theme::Github => [2.0, 1.5, 1.25, 1.1, 1.0, 0.9],
            Theme::Academic => [1.8, 1.4, 1.2, 1.1, 1.0, 1.0],
            Theme::Minimal => [1.5, 1.3, 1.15, 1.05, 1.0, 1.0],
        };
        scales[usize::from(level.clamp(1, 6)) - 1]
    }

    /// Draw a rule under h1 and h2.
    pub fn rules_under_headings(self) -> bool {
        matches!(self, Theme::Github)
    }

    pub fn centre_title(self) -> bool {
        matches!(self, Theme::Academic)
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Theme::Github => "github",
            Theme::Academic => "academic",
            Theme::Minimal => "minimal",
        })
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Theme::Github),
            "academic" => Ok(Theme::Academic),
            "minimal" => Ok(Theme::Minimal),
            other => Err(format!(
                "unknown theme '{other}' (expected github, academic or minimal)"
            )),
        }
    }
}

/// Styling for converted documents. Identical styles produce identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStyle {
    pub theme: Theme,
    /// Body text size in points. Default: 11.
    pub font_size: f32,
    /// Line advance as a multiple of the font size. Default: 1.4.
    pub line_height: f32,
    /// Page margin on all sides, in points. Default: 50.4 (0.7 in).
    pub margin: f32,
    pub page_width: f32,
    pub page_height: f32,
}

impl Default for DocumentStyle {
    fn default() -> Self {
        Self {
            theme: Theme::Github,
            font_size: 11.0,
            line_height: 1.4,
            margin: 50.4,
            page_width: A4_WIDTH,
            page_height: A4_HEIGHT,
        }
    }
}

impl DocumentStyle {
    pub fn with_theme(theme: Theme) -> Self {
        Self {
            theme,
            ..Self::default()
        }
    }

    pub fn content_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }

    pub fn body_font(&self, bold: bool, italic: bool) -> Font {
        Font::styled(self.theme.body_family(), bold, italic)
    }

    pub fn heading_font(&self) -> Font {
        Font::styled(self.theme.body_family(), true, false)
    }

    /// Clamp values into a range the layout engine can work with.
    pub fn sanitized(&self) -> Self {
        let mut s = self.clone();
        s.font_size = s.font_size.clamp(6.0, 32.0);
        s.line_height = s.line_height.clamp(1.0, 3.0);
        s.page_width = s.page_width.max(144.0);
        s.page_height = s.page_height.max(144.0);
        s.margin = s.margin.clamp(0.0, s.page_width.min(s.page_height) / 4.0);
        s
    }
}
