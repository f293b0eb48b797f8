use alloc::vec::Vec;
use embedded_io::{Read, Write};
use log::info;

use crate::{
    color::encode16,
    screen::{SCREEN_COUNT, ScreenBank},
};

/// Every patch site marker is this long, and the scanner window with it.
const MARKER_LEN: usize = 20;

/// Sentinel before the function screen image table.
const FUNCTIONS_MARKER: [u8; MARKER_LEN] = [
    0xFC, 0xFC, 0xFC, 0xFC, 0xFC, 0xFC, 0xFC, 0xFC, 0xFC, 0xFC, 0xFC, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0x00, 0x00, 0x00,
];
/// Sentinel before the backlight color table.
const COLORS_MARKER: [u8; MARKER_LEN] = [
    0xFC, 0xFC, 0xFC, 0xFC, 0xFC, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x39,
    0xB9, 0xEA, 0xAA, 0x8D, 0x8D,
];
/// Sentinel before the full screen default image.
const DEFAULT_MARKER: [u8; MARKER_LEN] = *b"Defaults to control.";

/// Placeholder bytes following each marker in a donor file. Each site
/// consumes its marker's final byte plus the placeholder, and emits
/// exactly as many payload bytes, so patching never changes the length.
const FUNCTIONS_PLACEHOLDER: usize = 897;
const COLORS_PLACEHOLDER: usize = 42;
const DEFAULT_PLACEHOLDER: usize = 513;

/// Which sites a patch pass found and rewrote. Doubles as the scanner's
/// disarm state: a rewritten site is never matched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchSummary {
    pub function_images: bool,
    pub backlight_colors: bool,
    pub default_image: bool,
}

impl PatchSummary {
    pub fn is_complete(&self) -> bool {
        self.function_images && self.backlight_colors && self.default_image
    }

    /// Names of the sites that were never found, for reporting.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.function_images {
            missing.push("function images");
        }
        if !self.backlight_colors {
            missing.push("backlight colors");
        }
        if !self.default_image {
            missing.push("default image");
        }
        missing
    }
}

/// Error type for a firmware patch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchError {
    /// Donor or output stream failure. The pass stops where it was.
    Io(embedded_io::ErrorKind),
    /// The donor ended with at least one marker never seen. Everything
    /// written stays written; the summary says which sites were rewritten.
    Incomplete(PatchSummary),
}

impl PatchError {
    fn from_io_error(error: impl embedded_io::Error) -> Self {
        PatchError::Io(error.kind())
    }
}

impl core::fmt::Display for PatchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PatchError::Io(kind) => write!(f, "stream failure: {:?}", kind),
            PatchError::Incomplete(summary) => {
                write!(f, "donor ended without: {}", summary.missing().join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Site {
    Functions,
    Colors,
    Default,
}

/// Sliding window over the last [`MARKER_LEN`] scanned donor bytes.
/// Placeholder bytes are consumed without passing through here, so the
/// window carries its pre-skip contents across a patch site.
struct Scanner {
    window: [u8; MARKER_LEN],
    filled: usize,
}

impl Scanner {
    fn new() -> Self {
        Self {
            window: [0; MARKER_LEN],
            filled: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        self.window.copy_within(1.., 0);
        self.window[MARKER_LEN - 1] = byte;
        if self.filled < MARKER_LEN {
            self.filled += 1;
        }
    }

    /// First still-armed marker the window equals, if any. Candidacy is
    /// checked in a fixed order so a hypothetical tie resolves the same
    /// way every run.
    fn match_site(&self, summary: &PatchSummary) -> Option<Site> {
        if self.filled < MARKER_LEN {
            return None;
        }
        if !summary.function_images && self.window == FUNCTIONS_MARKER {
            return Some(Site::Functions);
        }
        if !summary.backlight_colors && self.window == COLORS_MARKER {
            return Some(Site::Colors);
        }
        if !summary.default_image && self.window == DEFAULT_MARKER {
            return Some(Site::Default);
        }
        None
    }
}

/// Copy a donor firmware stream to `out`, rewriting the three marker
/// sites with the bank's images and colors.
///
/// Single forward pass. Every byte outside the sites is copied verbatim;
/// at a site, the marker's final byte and the placeholder region behind it
/// are replaced by the computed payload of the same length. Placeholder
/// bytes are never scanned for further markers.
pub fn patch<Donor, Out>(
    donor: &mut Donor,
    out: &mut Out,
    bank: &ScreenBank,
) -> Result<PatchSummary, PatchError>
where
    Donor: Read,
    Out: Write,
{
    let mut scanner = Scanner::new();
    let mut summary = PatchSummary::default();
    let mut skip = 0usize;
    let mut position = 0u64;
    let mut chunk = [0u8; 512];

    loop {
        let read = donor.read(&mut chunk).map_err(PatchError::from_io_error)?;
        if read == 0 {
            break;
        }

        // First byte of the chunk not yet copied through.
        let mut run_start = 0;
        for index in 0..read {
            if skip > 0 {
                skip -= 1;
                run_start = index + 1;
                position += 1;
                continue;
            }

            scanner.push(chunk[index]);
            if let Some(site) = scanner.match_site(&summary) {
                out.write_all(&chunk[run_start..index])
                    .map_err(PatchError::from_io_error)?;
                run_start = index + 1;
                info!(
                    "{} site at donor offset {:#x}",
                    site_name(site),
                    position + 1 - MARKER_LEN as u64
                );
                match site {
                    Site::Functions => {
                        write_function_images(out, bank)?;
                        summary.function_images = true;
                        skip = FUNCTIONS_PLACEHOLDER;
                    }
                    Site::Colors => {
                        write_backlight_colors(out, bank)?;
                        summary.backlight_colors = true;
                        skip = COLORS_PLACEHOLDER;
                    }
                    Site::Default => {
                        write_default_image(out, bank)?;
                        summary.default_image = true;
                        skip = DEFAULT_PLACEHOLDER;
                    }
                }
            }
            position += 1;
        }
        out.write_all(&chunk[run_start..read])
            .map_err(PatchError::from_io_error)?;
    }

    if summary.is_complete() {
        Ok(summary)
    } else {
        Err(PatchError::Incomplete(summary))
    }
}

fn site_name(site: Site) -> &'static str {
    match site {
        Site::Functions => "function images",
        Site::Colors => "backlight colors",
        Site::Default => "default image",
    }
}

/// Two alignment zeroes, then the packed images of screens 1..7.
fn write_function_images<Out: Write>(out: &mut Out, bank: &ScreenBank) -> Result<(), PatchError> {
    out.write_all(&[0x00, 0x00])
        .map_err(PatchError::from_io_error)?;
    for screen in 1..SCREEN_COUNT {
        out.write_all(bank.screen(screen).pixels().as_bytes())
            .map_err(PatchError::from_io_error)?;
    }
    Ok(())
}

/// One structure byte, then big-endian channel values for screens 1..7.
/// Screen 0's backlight is not stored in the firmware.
fn write_backlight_colors<Out: Write>(out: &mut Out, bank: &ScreenBank) -> Result<(), PatchError> {
    out.write_all(&[0x8D]).map_err(PatchError::from_io_error)?;
    for screen in 1..SCREEN_COUNT {
        for channel in bank.screen(screen).color().channels() {
            out.write_all(&encode16(channel).to_be_bytes())
                .map_err(PatchError::from_io_error)?;
        }
    }
    Ok(())
}

/// A dot, an alignment zero, then screen 0's packed image.
fn write_default_image<Out: Write>(out: &mut Out, bank: &ScreenBank) -> Result<(), PatchError> {
    out.write_all(b".\x00").map_err(PatchError::from_io_error)?;
    out.write_all(bank.screen(0).pixels().as_bytes())
        .map_err(PatchError::from_io_error)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::vec;

    use crate::{bitmap::Bitmap, color::ColorSetting};

    fn test_bank() -> ScreenBank {
        let mut bitmaps = [
            Bitmap::new(128, 32),
            Bitmap::new(32, 32),
            Bitmap::new(32, 32),
            Bitmap::new(32, 32),
            Bitmap::new(32, 32),
            Bitmap::new(32, 32),
            Bitmap::new(32, 32),
            Bitmap::new(32, 32),
        ];
        for (screen, bitmap) in bitmaps.iter_mut().enumerate() {
            bitmap.set(0, 0, true);
            bitmap.set(screen, screen, true);
        }
        ScreenBank::assemble(bitmaps, ColorSetting::DEFAULTS).unwrap()
    }

    fn expected_function_payload(bank: &ScreenBank) -> Vec<u8> {
        let mut payload = vec![0x00, 0x00];
        for screen in 1..SCREEN_COUNT {
            payload.extend_from_slice(bank.screen(screen).pixels().as_bytes());
        }
        payload
    }

    fn expected_color_payload(bank: &ScreenBank) -> Vec<u8> {
        let mut payload = vec![0x8D];
        for screen in 1..SCREEN_COUNT {
            for channel in bank.screen(screen).color().channels() {
                payload.extend_from_slice(&encode16(channel).to_be_bytes());
            }
        }
        payload
    }

    fn expected_default_payload(bank: &ScreenBank) -> Vec<u8> {
        let mut payload = vec![b'.', 0x00];
        payload.extend_from_slice(bank.screen(0).pixels().as_bytes());
        payload
    }

    /// Donor region for one site: the marker followed by its placeholder.
    fn site_region(marker: &[u8; MARKER_LEN], placeholder: usize) -> Vec<u8> {
        let mut region = marker.to_vec();
        region.extend(core::iter::repeat_n(0xA5, placeholder));
        region
    }

    #[test]
    fn patches_all_three_sites() {
        let bank = test_bank();
        let mut donor = vec![0x11u8; 300];
        donor.extend(site_region(&FUNCTIONS_MARKER, FUNCTIONS_PLACEHOLDER));
        donor.extend([0x22u8; 77]);
        donor.extend(site_region(&COLORS_MARKER, COLORS_PLACEHOLDER));
        donor.extend([0x33u8; 600]);
        donor.extend(site_region(&DEFAULT_MARKER, DEFAULT_PLACEHOLDER));
        donor.extend([0x44u8; 1000]);

        let mut out = Vec::new();
        let summary = patch(&mut donor.as_slice(), &mut out, &bank).unwrap();
        assert!(summary.is_complete());
        assert!(summary.missing().is_empty());

        let mut expected = vec![0x11u8; 300];
        expected.extend_from_slice(&FUNCTIONS_MARKER[..MARKER_LEN - 1]);
        expected.extend(expected_function_payload(&bank));
        expected.extend([0x22u8; 77]);
        expected.extend_from_slice(&COLORS_MARKER[..MARKER_LEN - 1]);
        expected.extend(expected_color_payload(&bank));
        expected.extend([0x33u8; 600]);
        expected.extend_from_slice(&DEFAULT_MARKER[..MARKER_LEN - 1]);
        expected.extend(expected_default_payload(&bank));
        expected.extend([0x44u8; 1000]);

        assert_eq!(out.len(), donor.len());
        assert_eq!(out, expected);
    }

    #[test]
    fn site_order_in_the_donor_does_not_matter() {
        let bank = test_bank();
        let mut donor = site_region(&DEFAULT_MARKER, DEFAULT_PLACEHOLDER);
        donor.extend(site_region(&COLORS_MARKER, COLORS_PLACEHOLDER));
        donor.extend(site_region(&FUNCTIONS_MARKER, FUNCTIONS_PLACEHOLDER));

        let mut out = Vec::new();
        let summary = patch(&mut donor.as_slice(), &mut out, &bank).unwrap();
        assert!(summary.is_complete());
        assert_eq!(out.len(), donor.len());
        assert_eq!(&out[MARKER_LEN - 1..MARKER_LEN + 1], b".\x00");
    }

    #[test]
    fn missing_marker_reports_incomplete_but_patches_the_rest() {
        let bank = test_bank();
        let mut donor = site_region(&FUNCTIONS_MARKER, FUNCTIONS_PLACEHOLDER);
        donor.extend(site_region(&DEFAULT_MARKER, DEFAULT_PLACEHOLDER));

        let mut out = Vec::new();
        let err = patch(&mut donor.as_slice(), &mut out, &bank).unwrap_err();
        let PatchError::Incomplete(summary) = err else {
            panic!("expected Incomplete, got {:?}", err);
        };
        assert!(summary.function_images);
        assert!(!summary.backlight_colors);
        assert!(summary.default_image);
        assert_eq!(summary.missing(), ["backlight colors"]);

        // Both present sites still got their payloads.
        assert_eq!(out.len(), donor.len());
        let functions = expected_function_payload(&bank);
        assert_eq!(&out[MARKER_LEN - 1..MARKER_LEN - 1 + functions.len()], functions);
    }

    #[test]
    fn each_marker_fires_at_most_once() {
        let bank = test_bank();
        let mut donor = site_region(&DEFAULT_MARKER, DEFAULT_PLACEHOLDER);
        donor.extend(site_region(&DEFAULT_MARKER, DEFAULT_PLACEHOLDER));

        let mut out = Vec::new();
        let err = patch(&mut donor.as_slice(), &mut out, &bank).unwrap_err();
        assert!(matches!(err, PatchError::Incomplete(_)));

        // The second occurrence passes through untouched.
        let second = MARKER_LEN + DEFAULT_PLACEHOLDER;
        assert_eq!(&out[second..second + MARKER_LEN], DEFAULT_MARKER);
    }

    #[test]
    fn placeholder_bytes_are_not_scanned() {
        let bank = test_bank();
        // A colors marker buried inside the functions placeholder must not
        // fire, and its bytes are overwritten rather than copied.
        let mut region = FUNCTIONS_MARKER.to_vec();
        region.extend([0xA5; 100]);
        region.extend(COLORS_MARKER);
        region.extend([0xA5; FUNCTIONS_PLACEHOLDER - 100 - MARKER_LEN]);

        let mut out = Vec::new();
        let err = patch(&mut region.as_slice(), &mut out, &bank).unwrap_err();
        let PatchError::Incomplete(summary) = err else {
            panic!("expected Incomplete, got {:?}", err);
        };
        assert!(summary.function_images);
        assert!(!summary.backlight_colors);
        assert_eq!(out.len(), region.len());
    }

    #[test]
    fn window_survives_chunk_boundaries() {
        let bank = test_bank();
        // Lead-in sized so the marker straddles the 512 byte read chunk.
        let mut donor = vec![0x55u8; 505];
        donor.extend(site_region(&COLORS_MARKER, COLORS_PLACEHOLDER));
        donor.extend(site_region(&FUNCTIONS_MARKER, FUNCTIONS_PLACEHOLDER));
        donor.extend(site_region(&DEFAULT_MARKER, DEFAULT_PLACEHOLDER));

        let mut out = Vec::new();
        let summary = patch(&mut donor.as_slice(), &mut out, &bank).unwrap();
        assert!(summary.is_complete());
        assert_eq!(out.len(), donor.len());
        let colors = expected_color_payload(&bank);
        assert_eq!(&out[505 + MARKER_LEN - 1..505 + MARKER_LEN - 1 + colors.len()], colors);
    }

    #[test]
    fn truncated_placeholder_still_counts_the_site() {
        let bank = test_bank();
        // Donor ends in the middle of the default image placeholder.
        let mut donor = DEFAULT_MARKER.to_vec();
        donor.extend([0xA5; 40]);

        let mut out = Vec::new();
        let err = patch(&mut donor.as_slice(), &mut out, &bank).unwrap_err();
        let PatchError::Incomplete(summary) = err else {
            panic!("expected Incomplete, got {:?}", err);
        };
        assert!(summary.default_image);
        let expected = expected_default_payload(&bank);
        assert_eq!(&out[MARKER_LEN - 1..], expected);
    }

    struct FailingReader;

    impl embedded_io::ErrorType for FailingReader {
        type Error = embedded_io::ErrorKind;
    }

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> {
            Err(embedded_io::ErrorKind::Other)
        }
    }

    #[test]
    fn stream_failures_surface_as_io_errors() {
        let bank = test_bank();
        let mut out = Vec::new();
        let err = patch(&mut FailingReader, &mut out, &bank).unwrap_err();
        assert_eq!(err, PatchError::Io(embedded_io::ErrorKind::Other));
    }

    #[test]
    fn marker_constants_are_marker_sized() {
        assert_eq!(FUNCTIONS_MARKER.len(), MARKER_LEN);
        assert_eq!(COLORS_MARKER.len(), MARKER_LEN);
        assert_eq!(DEFAULT_MARKER.len(), MARKER_LEN);
        assert_eq!(FUNCTIONS_MARKER.iter().filter(|&&b| b == 0xFC).count(), 11);
    }
}
