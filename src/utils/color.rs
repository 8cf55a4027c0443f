//! Border color parsing and formatting

use crate::error::{BgRemovalError, Result};
use std::fmt;
use std::str::FromStr;

/// Named colors accepted in addition to hex notation
const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("black", [0, 0, 0]),
    ("white", [255, 255, 255]),
    ("red", [255, 0, 0]),
    ("green", [0, 128, 0]),
    ("lime", [0, 255, 0]),
    ("blue", [0, 0, 255]),
    ("yellow", [255, 255, 0]),
    ("cyan", [0, 255, 255]),
    ("magenta", [255, 0, 255]),
    ("orange", [255, 165, 0]),
    ("purple", [128, 0, 128]),
    ("gray", [128, 128, 128]),
    ("grey", [128, 128, 128]),
];

/// An opaque RGB border color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BorderColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl BorderColor {
    /// Default border color used when the caller does not supply one
    pub const RED: Self = Self::new(255, 0, 0);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a color string
    ///
    /// Supports `#RRGGBB`, `#RGB` (the `#` is optional) and a small set of
    /// CSS color names, case-insensitive.
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_server::BorderColor;
    ///
    /// let red = BorderColor::parse("#FF0000")?;
    /// assert_eq!(red.to_rgb(), [255, 0, 0]);
    ///
    /// let blue = BorderColor::parse("00f")?;
    /// assert_eq!(blue, BorderColor::new(0, 0, 255));
    /// # Ok::<(), bgremove_server::BgRemovalError>(())
    /// ```
    ///
    /// # Errors
    /// - `InvalidColor` if the string is neither valid hex nor a known name
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();

        if let Some(rgb) = lookup_named(trimmed) {
            return Ok(Self::from(rgb));
        }

        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BgRemovalError::invalid_color(format!(
                "'{input}' is not a hex color or known color name"
            )));
        }

        match hex.len() {
            6 => Ok(Self::new(
                parse_component(hex, 0..2, input)?,
                parse_component(hex, 2..4, input)?,
                parse_component(hex, 4..6, input)?,
            )),
            // #RGB expands each digit, e.g. #f00 -> #ff0000
            3 => Ok(Self::new(
                parse_component(hex, 0..1, input)? * 17,
                parse_component(hex, 1..2, input)? * 17,
                parse_component(hex, 2..3, input)? * 17,
            )),
            _ => Err(BgRemovalError::invalid_color(format!(
                "'{input}' must be in #RRGGBB or #RGB format"
            ))),
        }
    }

    /// Format as lowercase `#rrggbb`
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    #[must_use]
    pub fn to_rgb(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

fn lookup_named(name: &str) -> Option<[u8; 3]> {
    NAMED_COLORS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, rgb)| *rgb)
}

fn parse_component(hex: &str, range: std::ops::Range<usize>, input: &str) -> Result<u8> {
    hex.get(range)
        .and_then(|digits| u8::from_str_radix(digits, 16).ok())
        .ok_or_else(|| BgRemovalError::invalid_color(format!("'{input}' has an invalid component")))
}

impl Default for BorderColor {
    fn default() -> Self {
        Self::RED
    }
}

impl From<[u8; 3]> for BorderColor {
    fn from(rgb: [u8; 3]) -> Self {
        let [r, g, b] = rgb;
        Self::new(r, g, b)
    }
}

impl FromStr for BorderColor {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BorderColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
