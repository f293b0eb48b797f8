use std::{
    fs,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use embedded_io::ErrorType;
use kiilcd_core::{
    bitmap::Bitmap,
    color::{self, ColorConfigError, ColorSetting},
    screen::{SCREEN_COUNT, ScreenBank, SizeMismatch},
};

/// Backlight configuration file kept next to the images.
pub const COLORS_FILE: &str = "colors.txt";

/// Keyboard half a donor firmware belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn repr(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Source image for one screen, `F0.bmp` through `F7.bmp`.
pub fn image_name(screen: usize) -> String {
    format!("F{}.bmp", screen)
}

/// Donor firmware produced by the vendor configurator for one half.
pub fn donor_name(side: Side) -> String {
    format!("{}_kiibohd.dfu.bin", side.repr())
}

/// Patched firmware written next to the donor.
pub fn output_name(side: Side) -> String {
    format!("custom_{}_kiibohd.dfu.bin", side.repr())
}

/// Error type for loading and storing the editor's working files.
#[derive(Debug)]
pub enum AssetError {
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    Size {
        path: PathBuf,
        mismatch: SizeMismatch,
    },
    Config {
        path: PathBuf,
        source: ColorConfigError,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for AssetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetError::Image { path, source } => write!(f, "{}: {}", path.display(), source),
            AssetError::Size { path, mismatch } => write!(f, "{}: {}", path.display(), mismatch),
            AssetError::Config { path, source } => write!(f, "{}: {}", path.display(), source),
            AssetError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
        }
    }
}

/// Load one screen's source image and threshold it to monochrome.
/// Luma below 128 is dark, so 1-bit sources keep 0 as the lit segment.
pub fn load_bitmap(path: &Path) -> Result<Bitmap, AssetError> {
    let image = match image::open(path) {
        Ok(image) => image.into_luma8(),
        Err(source) => {
            return Err(AssetError::Image {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut bitmap = Bitmap::new(image.width() as usize, image.height() as usize);
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[0] < 128 {
            bitmap.set(x as usize, y as usize, true);
        }
    }
    Ok(bitmap)
}

fn load_bitmaps(dir: &Path) -> Result<[Bitmap; SCREEN_COUNT], AssetError> {
    let load = |screen: usize| load_bitmap(&dir.join(image_name(screen)));
    Ok([
        load(0)?,
        load(1)?,
        load(2)?,
        load(3)?,
        load(4)?,
        load(5)?,
        load(6)?,
        load(7)?,
    ])
}

pub fn load_colors(dir: &Path) -> Result<[ColorSetting; SCREEN_COUNT], AssetError> {
    let path = dir.join(COLORS_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(source) => return Err(AssetError::Io { path, source }),
    };
    color::parse_colors(&text).map_err(|source| AssetError::Config { path, source })
}

pub fn save_colors(dir: &Path, colors: &[ColorSetting; SCREEN_COUNT]) -> Result<(), AssetError> {
    let path = dir.join(COLORS_FILE);
    fs::write(&path, color::render_colors(colors)).map_err(|source| AssetError::Io { path, source })
}

/// Load the whole working set: eight images plus the backlight table.
pub fn load_bank(dir: &Path) -> Result<ScreenBank, AssetError> {
    let colors = load_colors(dir)?;
    let bitmaps = load_bitmaps(dir)?;
    ScreenBank::assemble(bitmaps, colors).map_err(|mismatch| AssetError::Size {
        path: dir.join(image_name(mismatch.screen)),
        mismatch,
    })
}

/// Donor firmware opened for streaming reads.
pub struct DonorStream {
    file: BufReader<fs::File>,
}

impl DonorStream {
    pub fn open(path: &Path) -> Result<Self, AssetError> {
        match fs::File::open(path) {
            Ok(file) => Ok(Self {
                file: BufReader::new(file),
            }),
            Err(source) => Err(AssetError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl ErrorType for DonorStream {
    type Error = std::io::Error;
}

impl embedded_io::Read for DonorStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        use std::io::Read;
        self.file.read(buf)
    }
}

/// Patched firmware being written.
pub struct OutputStream {
    file: BufWriter<fs::File>,
}

impl OutputStream {
    pub fn create(path: &Path) -> Result<Self, AssetError> {
        match fs::File::create(path) {
            Ok(file) => Ok(Self {
                file: BufWriter::new(file),
            }),
            Err(source) => Err(AssetError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Push everything to disk. Dropping instead would swallow write errors.
    pub fn finish(mut self) -> std::io::Result<()> {
        use std::io::Write;
        self.file.flush()
    }
}

impl ErrorType for OutputStream {
    type Error = std::io::Error;
}

impl embedded_io::Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        use std::io::Write;
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        use std::io::Write;
        self.file.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn each_side_names_its_own_donor() {
        assert_eq!(donor_name(Side::Left), "left_kiibohd.dfu.bin");
        assert_eq!(donor_name(Side::Right), "right_kiibohd.dfu.bin");
        assert_eq!(output_name(Side::Right), "custom_right_kiibohd.dfu.bin");
    }

    #[test]
    fn image_names_follow_the_screen_index() {
        assert_eq!(image_name(0), "F0.bmp");
        assert_eq!(image_name(7), "F7.bmp");
    }
}
