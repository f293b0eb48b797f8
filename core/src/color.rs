use alloc::{format, string::String, vec::Vec};
use core::num::IntErrorKind;

use crate::screen::SCREEN_COUNT;

/// Lines in the backlight configuration file: one value per channel per
/// screen, screen-major, channels ordered red, green, blue.
pub const CONFIG_LINES: usize = SCREEN_COUNT * 3;

/// Backlight brightness for one screen, as channel percentages clamped to
/// 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorSetting {
    red: u8,
    green: u8,
    blue: u8,
}

impl ColorSetting {
    /// Factory backlight colors for screens 0..7.
    pub const DEFAULTS: [ColorSetting; SCREEN_COUNT] = [
        ColorSetting { red: 6, green: 6, blue: 6 },
        ColorSetting { red: 65, green: 15, blue: 12 },
        ColorSetting { red: 30, green: 55, blue: 20 },
        ColorSetting { red: 0, green: 50, blue: 70 },
        ColorSetting { red: 96, green: 64, blue: 28 },
        ColorSetting { red: 72, green: 36, blue: 52 },
        ColorSetting { red: 74, green: 71, blue: 18 },
        ColorSetting { red: 1, green: 50, blue: 34 },
    ];

    pub fn new(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red: red.min(100),
            green: green.min(100),
            blue: blue.min(100),
        }
    }

    pub fn red(&self) -> u8 {
        self.red
    }

    pub fn green(&self) -> u8 {
        self.green
    }

    pub fn blue(&self) -> u8 {
        self.blue
    }

    /// Channel percentages in red, green, blue order.
    pub fn channels(&self) -> [u8; 3] {
        [self.red, self.green, self.blue]
    }

    /// Approximate sRGB rendering of this backlight for on-screen swatches.
    /// Display aid only, never part of the device encoding.
    pub fn swatch_rgb888(&self) -> [u8; 3] {
        self.channels().map(swatch)
    }
}

/// Scale a channel percentage to the device's 16 bit brightness range.
/// 0 maps to 0, 50 to 32767 and 100 to 65535.
pub fn encode16(percent: u8) -> u16 {
    (percent.min(100) as f64 * 655.35) as u16
}

fn swatch(percent: u8) -> u8 {
    (libm::pow(percent as f64, 0.25) * 80.638) as u8
}

/// Error type for the backlight configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorConfigError {
    /// A line that does not parse as a whole number, counted from one.
    InvalidValue { line: usize, content: String },
    /// Wrong number of lines for eight screens of three channels.
    LineCount(usize),
}

impl core::fmt::Display for ColorConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ColorConfigError::InvalidValue { line, content } => {
                write!(f, "line {} is not a whole number: {:?}", line, content)
            }
            ColorConfigError::LineCount(count) => {
                write!(f, "expected {} lines, found {}", CONFIG_LINES, count)
            }
        }
    }
}

/// Parse the 24-line backlight configuration. Values outside 0..=100 are
/// clamped, not rejected, however far out they are. The first malformed
/// line fails the whole file; a wrong line count is only reported once
/// every line parses.
pub fn parse_colors(text: &str) -> Result<[ColorSetting; SCREEN_COUNT], ColorConfigError> {
    let mut values = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let value = match line.trim().parse::<i64>() {
            Ok(value) => value.clamp(0, 100) as u8,
            // Overflow is out of range, not malformed.
            Err(error) => match error.kind() {
                IntErrorKind::PosOverflow => 100,
                IntErrorKind::NegOverflow => 0,
                _ => {
                    return Err(ColorConfigError::InvalidValue {
                        line: index + 1,
                        content: String::from(line.trim()),
                    });
                }
            },
        };
        values.push(value);
    }
    if values.len() != CONFIG_LINES {
        return Err(ColorConfigError::LineCount(values.len()));
    }

    let mut colors = [ColorSetting::default(); SCREEN_COUNT];
    for (screen, channels) in values.chunks_exact(3).enumerate() {
        colors[screen] = ColorSetting::new(channels[0], channels[1], channels[2]);
    }
    Ok(colors)
}

/// Render the configuration back to its file form, one value per line.
/// Load, render, load is the identity on clamped values.
pub fn render_colors(colors: &[ColorSetting; SCREEN_COUNT]) -> String {
    let mut out = String::new();
    for color in colors {
        for channel in color.channels() {
            out.push_str(&format!("{}\n", channel));
        }
    }
    out
}
