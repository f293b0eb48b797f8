use alloc::{format, string::String, vec::Vec};
use core::time::Duration;

use crate::{
    color::{ColorSetting, encode16},
    screen::{PLANES, PixelBuffer},
};

/// Line rate of the keyboard's serial console.
pub const BAUD: u32 = 115_200;
/// USB identity of the console port.
pub const USB_VID: u16 = 0x1C11;
pub const USB_PID: u16 = 0xB04D;

/// Sixteen-column groups a display line is streamed in.
const SEGMENTS: usize = 8;
const SEGMENT_COLUMNS: usize = 16;

const INIT_SETTLE: Duration = Duration::from_millis(100);
const COLOR_SETTLE: Duration = Duration::from_millis(50);
const DISP_SETTLE: Duration = Duration::from_millis(30);

/// One line of the preview protocol, plus the idle time the transport has
/// to leave after sending it before the device accepts the next line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewCommand {
    pub text: String,
    pub settle: Duration,
}

/// Clear command, sent once before any per-screen data.
pub fn init_command() -> PreviewCommand {
    PreviewCommand {
        text: String::from("lcdInit\r"),
        settle: INIT_SETTLE,
    }
}

/// Backlight command carrying the 16 bit channel values in decimal.
pub fn color_command(color: ColorSetting) -> PreviewCommand {
    let [red, green, blue] = color.channels();
    PreviewCommand {
        text: format!(
            "lcdColor {} {} {} \r",
            encode16(red),
            encode16(green),
            encode16(blue)
        ),
        settle: COLOR_SETTLE,
    }
}

/// One display line: sixteen column bytes of one plane. Numeric fields use
/// unpadded lowercase hex with the 0x prefix, which is what the device's
/// console parser takes. Columns past the buffer width are sent as 0x0.
fn disp_command(pixels: &PixelBuffer, plane: usize, segment: usize) -> PreviewCommand {
    let offset = segment * SEGMENT_COLUMNS;
    let mut text = format!("lcdDisp {:#x} {:#x} ", plane, offset);
    for x in offset..offset + SEGMENT_COLUMNS {
        text.push_str(&format!("{:#x} ", pixels.column_byte(plane, x)));
    }
    text.push('\r');
    PreviewCommand {
        text,
        settle: DISP_SETTLE,
    }
}

/// Full sequence to preview one screen: clear, backlight, then the 32
/// display lines in the device's segment-major order. Narrow screens
/// stream blank bytes for the columns they do not cover.
pub fn screen_commands(color: ColorSetting, pixels: &PixelBuffer) -> Vec<PreviewCommand> {
    let mut commands = Vec::with_capacity(2 + SEGMENTS * PLANES);
    commands.push(init_command());
    commands.push(color_command(color));
    for segment in 0..SEGMENTS {
        for plane in 0..PLANES {
            commands.push(disp_command(pixels, plane, segment));
        }
    }
    commands
}
