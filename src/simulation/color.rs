use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    #[error("malformed color {0:?}, expected #RRGGBB or #RRGGBBAA")]
    MalformedColor(String),
}

/// An RGBA stroke color as handed to the renderer in hex notation.
///
/// The alpha channel is kept as a signed integer. Decaying routes subtract a fixed step per tick
/// and are only evicted once the alpha is `<= 0`, so the value may be negative for one tick.
/// When encoded, the alpha is clamped into the range of one hex channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StrokeColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub alpha: i32,
}

impl StrokeColor {
    pub const OPAQUE: i32 = 255;

    pub fn new(r: u8, g: u8, b: u8, alpha: i32) -> Self {
        StrokeColor { r, g, b, alpha }
    }

    pub fn fade(&mut self, step: i32) {
        self.alpha -= step;
    }

    pub fn is_transparent(&self) -> bool {
        self.alpha <= 0
    }

    pub fn to_hex(&self) -> String {
        format!(
            "#{:02X}{:02X}{:02X}{:02X}",
            self.r,
            self.g,
            self.b,
            self.alpha.clamp(0, Self::OPAQUE)
        )
    }
}

impl FromStr for StrokeColor {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ColorError::MalformedColor(s.to_string());

        let hex = s.strip_prefix('#').ok_or_else(malformed)?;
        if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(malformed());
        }

        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| malformed());
        let alpha = if hex.len() == 8 {
            channel(6)? as i32
        } else {
            Self::OPAQUE
        };

        Ok(StrokeColor::new(channel(0)?, channel(2)?, channel(4)?, alpha))
    }
}

impl TryFrom<String> for StrokeColor {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StrokeColor> for String {
    fn from(value: StrokeColor) -> Self {
        value.to_hex()
    }
}

impl Display for StrokeColor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
