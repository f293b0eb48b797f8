use alloc::{vec, vec::Vec};

use crate::{bitmap::Bitmap, color::ColorSetting};

/// Independently addressable screens on the keyboard. Screen 0 is the full
/// width display, screens 1..7 are the narrow function tiles.
pub const SCREEN_COUNT: usize = 8;
/// Pixel rows per screen.
pub const ROWS: usize = 32;
/// Eight-row bands composing a screen image.
pub const PLANES: usize = 4;

/// Column count for a screen.
pub const fn width(screen: usize) -> usize {
    if screen == 0 { 128 } else { 32 }
}

/// An image does not have the dimensions of the screen it is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeMismatch {
    pub screen: usize,
    pub expected: (usize, usize),
    pub actual: (usize, usize),
}

impl core::fmt::Display for SizeMismatch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "screen {} needs a {}x{} image, got {}x{}",
            self.screen, self.expected.0, self.expected.1, self.actual.0, self.actual.1
        )
    }
}

/// Plane-major packing of one screen image in the device's scan order.
/// Each byte covers eight vertical pixels of one column within a plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: usize,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn width(&self) -> usize {
        self.width
    }

    /// Raw device bytes, `PLANES * width` long.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Byte for one column of one plane. Columns past the real width read
    /// as blank, which is what the preview protocol sends for the unused
    /// part of a narrow screen's line.
    pub fn column_byte(&self, plane: usize, x: usize) -> u8 {
        if x >= self.width {
            return 0;
        }
        self.data[plane * self.width + x]
    }
}

/// Pack a bitmap into the device's plane-major scan order. Bit z of byte
/// `[p*width + x]` holds the pixel at column x, row `(3-p)*8 + 7-z`; the
/// bit is set when that pixel is dark.
pub fn rasterize(bitmap: &Bitmap, screen: usize) -> Result<PixelBuffer, SizeMismatch> {
    let width = width(screen);
    if bitmap.width() != width || bitmap.height() != ROWS {
        return Err(SizeMismatch {
            screen,
            expected: (width, ROWS),
            actual: (bitmap.width(), bitmap.height()),
        });
    }

    let mut data = vec![0u8; PLANES * width];
    for plane in 0..PLANES {
        for x in 0..width {
            for z in 0..8 {
                if bitmap.get(x, (3 - plane) * 8 + 7 - z) {
                    data[plane * width + x] |= 1 << z;
                }
            }
        }
    }
    Ok(PixelBuffer { width, data })
}

/// Everything known about one screen: the source bitmap, its packed form
/// and the backlight color. The packed form is kept in step with the
/// bitmap so patching and previewing never rasterize on the fly.
pub struct ScreenState {
    screen: usize,
    bitmap: Bitmap,
    pixels: PixelBuffer,
    color: ColorSetting,
}

impl ScreenState {
    pub fn new(screen: usize, bitmap: Bitmap, color: ColorSetting) -> Result<Self, SizeMismatch> {
        let pixels = rasterize(&bitmap, screen)?;
        Ok(Self {
            screen,
            bitmap,
            pixels,
            color,
        })
    }

    pub fn screen(&self) -> usize {
        self.screen
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    pub fn color(&self) -> ColorSetting {
        self.color
    }

    /// Replace the image. On a size mismatch the previous image stays.
    pub fn set_bitmap(&mut self, bitmap: Bitmap) -> Result<(), SizeMismatch> {
        self.pixels = rasterize(&bitmap, self.screen)?;
        self.bitmap = bitmap;
        Ok(())
    }

    pub fn set_color(&mut self, color: ColorSetting) {
        self.color = color;
    }
}

/// The eight screens of one keyboard half, owned by the frontend and
/// passed by reference into the patcher and the preview encoder.
pub struct ScreenBank {
    screens: [ScreenState; SCREEN_COUNT],
}

impl ScreenBank {
    pub fn assemble(
        bitmaps: [Bitmap; SCREEN_COUNT],
        colors: [ColorSetting; SCREEN_COUNT],
    ) -> Result<Self, SizeMismatch> {
        let [b0, b1, b2, b3, b4, b5, b6, b7] = bitmaps;
        let screens = [
            ScreenState::new(0, b0, colors[0])?,
            ScreenState::new(1, b1, colors[1])?,
            ScreenState::new(2, b2, colors[2])?,
            ScreenState::new(3, b3, colors[3])?,
            ScreenState::new(4, b4, colors[4])?,
            ScreenState::new(5, b5, colors[5])?,
            ScreenState::new(6, b6, colors[6])?,
            ScreenState::new(7, b7, colors[7])?,
        ];
        Ok(Self { screens })
    }

    pub fn screen(&self, screen: usize) -> &ScreenState {
        &self.screens[screen]
    }

    pub fn screen_mut(&mut self, screen: usize) -> &mut ScreenState {
        &mut self.screens[screen]
    }

    pub fn screens(&self) -> &[ScreenState; SCREEN_COUNT] {
        &self.screens
    }

    /// Current backlight table, screen-major.
    pub fn colors(&self) -> [ColorSetting; SCREEN_COUNT] {
        core::array::from_fn(|screen| self.screens[screen].color())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn blank_bitmaps() -> [Bitmap; SCREEN_COUNT] {
        [
            Bitmap::new(128, 32),
            Bitmap::new(32, 32),
            Bitmap::new(32, 32),
            Bitmap::new(32, 32),
            Bitmap::new(32, 32),
            Bitmap::new(32, 32),
            Bitmap::new(32, 32),
            Bitmap::new(32, 32),
        ]
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let err = rasterize(&Bitmap::new(32, 32), 0).unwrap_err();
        assert_eq!(
            err,
            SizeMismatch {
                screen: 0,
                expected: (128, 32),
                actual: (32, 32),
            }
        );
        assert!(rasterize(&Bitmap::new(128, 32), 3).is_err());
        assert!(rasterize(&Bitmap::new(32, 31), 3).is_err());
    }

    #[test]
    fn packs_into_device_scan_order() {
        let mut bitmap = Bitmap::new(32, 32);
        // Top-left pixel lives in the last plane, highest bit.
        bitmap.set(0, 0, true);
        // Bottom-right pixel lives in the first plane, lowest bit.
        bitmap.set(31, 31, true);
        let pixels = rasterize(&bitmap, 1).unwrap();
        assert_eq!(pixels.as_bytes().len(), PLANES * 32);
        assert_eq!(pixels.column_byte(3, 0), 0x80);
        assert_eq!(pixels.column_byte(0, 31), 0x01);
        let lit: u32 = pixels.as_bytes().iter().map(|byte| byte.count_ones()).sum();
        assert_eq!(lit, 2);
    }

    #[test]
    fn dark_bitmap_packs_solid() {
        let mut bitmap = Bitmap::new(128, 32);
        for y in 0..32 {
            for x in 0..128 {
                bitmap.set(x, y, true);
            }
        }
        let pixels = rasterize(&bitmap, 0).unwrap();
        assert!(pixels.as_bytes().iter().all(|&byte| byte == 0xFF));
    }

    #[test]
    fn packing_round_trips() {
        let mut bitmap = Bitmap::new(32, 32);
        for y in 0..32 {
            for x in 0..32 {
                bitmap.set(x, y, (x * 31 + y * 7) % 3 == 0);
            }
        }
        let pixels = rasterize(&bitmap, 5).unwrap();
        for y in 0..32 {
            let plane = 3 - y / 8;
            let bit = 7 - y % 8;
            for x in 0..32 {
                let dark = (pixels.column_byte(plane, x) >> bit) & 1 == 1;
                assert_eq!(dark, bitmap.get(x, y), "pixel ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn columns_past_width_read_blank() {
        let mut bitmap = Bitmap::new(32, 32);
        bitmap.set(31, 0, true);
        let pixels = rasterize(&bitmap, 1).unwrap();
        assert_ne!(pixels.column_byte(3, 31), 0);
        assert_eq!(pixels.column_byte(3, 32), 0);
        assert_eq!(pixels.column_byte(0, 127), 0);
    }

    #[test]
    fn bank_wants_exact_geometry_per_screen() {
        let mut bitmaps = blank_bitmaps();
        bitmaps[4] = Bitmap::new(128, 32);
        let Err(err) = ScreenBank::assemble(bitmaps, ColorSetting::DEFAULTS) else {
            panic!("assembled a bank with a misfit bitmap");
        };
        assert_eq!(err.screen, 4);
        assert!(ScreenBank::assemble(blank_bitmaps(), ColorSetting::DEFAULTS).is_ok());
    }

    #[test]
    fn set_bitmap_keeps_state_on_mismatch() {
        let mut state =
            ScreenState::new(2, Bitmap::new(32, 32), ColorSetting::new(1, 2, 3)).unwrap();
        assert!(state.set_bitmap(Bitmap::new(128, 32)).is_err());
        assert_eq!(state.pixels().width(), 32);

        let mut replacement = Bitmap::new(32, 32);
        replacement.set(0, 0, true);
        state.set_bitmap(replacement).unwrap();
        assert_eq!(state.pixels().column_byte(3, 0), 0x80);
        assert_eq!(state.color().channels(), [1, 2, 3]);
    }
}
