//! Deterministic per-author colors.
//!
//! Two strategies are available: a fixed palette indexed by a character-code
//! checksum of the nickname, and a SHA-1-seeded generator that draws HSL
//! components inside bounds readable on both light and dark backgrounds.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Palette used by the checksum strategy.
pub const PALETTE: &[&str] = &[
    "#ff5733", "#33ff57", "#3357ff", "#ff33a6", "#a633ff",
    "#33fff5", "#ff8c33", "#57ff33", "#f5ff33", "#ff3357",
];

/// Returned when there is nothing to derive a color from.
pub const DEFAULT_COLOR: &str = "#888888";

pub const SATURATION_RANGE: std::ops::RangeInclusive<u8> = 50..=80;
pub const LIGHTNESS_RANGE: std::ops::RangeInclusive<u8> = 40..=70;

/// A display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Rgb { r: u8, g: u8, b: u8 },
    Hsl { hue: u16, saturation: u8, lightness: u8 },
}

impl Color {
    /// Parse `#rrggbb`. Returns `None` for anything else.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Color::Rgb {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    pub fn default_color() -> Self {
        // DEFAULT_COLOR is a valid literal.
        Color::from_hex(DEFAULT_COLOR).unwrap_or(Color::Rgb { r: 0x88, g: 0x88, b: 0x88 })
    }

    /// CSS representation: `#rrggbb` or `hsl(h, s%, l%)`.
    pub fn css(&self) -> String {
        match *self {
            Color::Rgb { r, g, b } => format!("#{r:02x}{g:02x}{b:02x}"),
            Color::Hsl { hue, saturation, lightness } => {
                format!("hsl({hue}, {saturation}%, {lightness}%)")
            }
        }
    }

    /// Convert to 8-bit RGB (for terminals).
    pub fn to_rgb(&self) -> (u8, u8, u8) {
        match *self {
            Color::Rgb { r, g, b } => (r, g, b),
            Color::Hsl { hue, saturation, lightness } => {
                let h = f64::from(hue % 360) / 60.0;
                let s = f64::from(saturation.min(100)) / 100.0;
                let l = f64::from(lightness.min(100)) / 100.0;

                let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
                let x = c * (1.0 - (h % 2.0 - 1.0).abs());
                let m = l - c / 2.0;
                let (r1, g1, b1) = match h as u8 {
                    0 => (c, x, 0.0),
                    1 => (x, c, 0.0),
                    2 => (0.0, c, x),
                    3 => (0.0, x, c),
                    4 => (x, 0.0, c),
                    _ => (c, 0.0, x),
                };
                let to_u8 = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
                (to_u8(r1), to_u8(g1), to_u8(b1))
            }
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.css())
    }
}

/// Which derivation [`ColorAssigner`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorStrategy {
    /// Fixed palette indexed by a nickname checksum. Collisions are likely.
    Palette,
    /// SHA-1 seeded HSL within readable bounds.
    #[default]
    Hashed,
}

impl std::fmt::Display for ColorStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorStrategy::Palette => write!(f, "palette"),
            ColorStrategy::Hashed  => write!(f, "hashed"),
        }
    }
}

/// Pure `(nick, id) -> Color` mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorAssigner {
    strategy: ColorStrategy,
}

impl ColorAssigner {
    pub fn new(strategy: ColorStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> ColorStrategy {
        self.strategy
    }

    pub fn color_for(&self, nick: &str, id: &str) -> Color {
        match self.strategy {
            ColorStrategy::Palette => palette_color(nick),
            ColorStrategy::Hashed => hashed_color(nick, id),
        }
    }
}

/// Sum of the nickname's character codes, modulo the palette size.
///
/// Each character contributes its first UTF-16 code unit, so characters
/// outside the BMP count as their high surrogate, as in the web client.
pub fn palette_color(nick: &str) -> Color {
    if nick.is_empty() {
        return Color::default_color();
    }
    let mut units = [0u16; 2];
    let checksum: u64 = nick
        .chars()
        .map(|c| u64::from(c.encode_utf16(&mut units)[0]))
        .sum();
    let idx = (checksum % PALETTE.len() as u64) as usize;
    Color::from_hex(PALETTE[idx]).unwrap_or_else(Color::default_color)
}

pub fn hashed_color(nick: &str, id: &str) -> Color {
    if nick.is_empty() && id.is_empty() {
        return Color::default_color();
    }

    let mut hasher = Sha1::new();
    hasher.update(nick.as_bytes());
    hasher.update([0u8]);
    hasher.update(id.as_bytes());
    let digest = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(seed));

    Color::Hsl {
        hue: rng.gen_range(0..360),
        saturation: rng.gen_range(SATURATION_RANGE),
        lightness: rng.gen_range(LIGHTNESS_RANGE),
    }
}
