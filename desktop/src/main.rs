use std::path::Path;

use argh::FromArgs;
use kiilcd_core::{
    color::ColorSetting,
    firmware::{self, PatchError},
    preview,
    screen::{SCREEN_COUNT, ScreenBank},
};
use log::{error, info, warn};

use crate::assets::Side;
use crate::port::SerialLink;

mod assets;
mod port;

/// Edit the eight LCD screens of an Infinity Ergodox keyboard: patch donor
/// firmware with custom images and backlight colors, or preview a screen
/// over the serial console.
#[derive(FromArgs)]
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Save(SaveArgs),
    Preview(PreviewArgs),
    Show(ShowArgs),
    Defaults(DefaultsArgs),
}

/// patch donor firmware with the current images and colors
#[derive(FromArgs)]
#[argh(subcommand, name = "save")]
struct SaveArgs {
    /// keyboard half to build: left, right or both
    #[argh(option, default = "String::from(\"both\")")]
    side: String,

    /// directory holding the images, colors.txt and the donors
    #[argh(option, short = 'd', default = "String::from(\".\")")]
    dir: String,
}

/// push one screen to an attached keyboard for a live preview
#[derive(FromArgs)]
#[argh(subcommand, name = "preview")]
struct PreviewArgs {
    /// screen index, 0 through 7
    #[argh(positional)]
    screen: usize,

    /// serial device of the keyboard console
    #[argh(option, short = 'p', default = "String::from(port::DEFAULT_PORT)")]
    port: String,

    /// directory holding the images and colors.txt
    #[argh(option, short = 'd', default = "String::from(\".\")")]
    dir: String,
}

/// list the loaded screens and their backlight colors
#[derive(FromArgs)]
#[argh(subcommand, name = "show")]
struct ShowArgs {
    /// directory holding the images and colors.txt
    #[argh(option, short = 'd', default = "String::from(\".\")")]
    dir: String,
}

/// write the factory backlight colors to colors.txt
#[derive(FromArgs)]
#[argh(subcommand, name = "defaults")]
struct DefaultsArgs {
    /// directory to write colors.txt into
    #[argh(option, short = 'd', default = "String::from(\".\")")]
    dir: String,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();
    let code = match args.command {
        Command::Save(save) => run_save(&save),
        Command::Preview(preview) => run_preview(&preview),
        Command::Show(show) => run_show(&show),
        Command::Defaults(defaults) => run_defaults(&defaults),
    };
    std::process::exit(code);
}

fn run_save(args: &SaveArgs) -> i32 {
    let sides: &[Side] = match args.side.as_str() {
        "left" => &[Side::Left],
        "right" => &[Side::Right],
        "both" => &[Side::Left, Side::Right],
        other => {
            error!("unknown side {:?}, expected left, right or both", other);
            return 2;
        }
    };

    let dir = Path::new(&args.dir);
    let bank = match assets::load_bank(dir) {
        Ok(bank) => bank,
        Err(err) => {
            error!("{}", err);
            return 1;
        }
    };

    // The configuration goes back to disk in its clamped form before any
    // firmware is touched, the way the original editor saved.
    if let Err(err) = assets::save_colors(dir, &bank.colors()) {
        error!("{}", err);
        return 1;
    }

    let mut failed = false;
    for &side in sides {
        if !save_side(dir, side, &bank) {
            failed = true;
        }
    }
    if failed { 1 } else { 0 }
}

fn save_side(dir: &Path, side: Side, bank: &ScreenBank) -> bool {
    let donor_path = dir.join(assets::donor_name(side));
    let output_path = dir.join(assets::output_name(side));
    info!(
        "patching {} into {}",
        donor_path.display(),
        output_path.display()
    );

    let mut donor = match assets::DonorStream::open(&donor_path) {
        Ok(donor) => donor,
        Err(err) => {
            error!("{}", err);
            return false;
        }
    };
    let mut output = match assets::OutputStream::create(&output_path) {
        Ok(output) => output,
        Err(err) => {
            error!("{}", err);
            return false;
        }
    };

    let result = firmware::patch(&mut donor, &mut output, bank);
    if let Err(err) = output.finish() {
        error!("{}: {}", output_path.display(), err);
        return false;
    }
    match result {
        Ok(_) => {
            info!("wrote {}", output_path.display());
            true
        }
        Err(PatchError::Incomplete(summary)) => {
            warn!(
                "{}: donor ended without: {}; kept {} but it is likely broken, fetch a fresh donor from the configurator",
                donor_path.display(),
                summary.missing().join(", "),
                output_path.display()
            );
            false
        }
        Err(err) => {
            error!("{}: {}", donor_path.display(), err);
            false
        }
    }
}

fn run_preview(args: &PreviewArgs) -> i32 {
    if args.screen >= SCREEN_COUNT {
        error!("screen {} does not exist, pick 0 through 7", args.screen);
        return 2;
    }

    let bank = match assets::load_bank(Path::new(&args.dir)) {
        Ok(bank) => bank,
        Err(err) => {
            error!("{}", err);
            return 1;
        }
    };

    let state = bank.screen(args.screen);
    let commands = preview::screen_commands(state.color(), state.pixels());
    info!(
        "pushing screen {} over {} ({} commands)",
        args.screen,
        args.port,
        commands.len()
    );

    let mut link = match SerialLink::open(Path::new(&args.port)) {
        Ok(link) => link,
        Err(err) => {
            error!("{}: {}", args.port, err);
            return 1;
        }
    };
    if let Err(err) = link.send_all(&commands) {
        error!("{}: {}", args.port, err);
        return 1;
    }
    0
}

fn run_show(args: &ShowArgs) -> i32 {
    let bank = match assets::load_bank(Path::new(&args.dir)) {
        Ok(bank) => bank,
        Err(err) => {
            error!("{}", err);
            return 1;
        }
    };

    for state in bank.screens() {
        let lit: u32 = state
            .pixels()
            .as_bytes()
            .iter()
            .map(|byte| byte.count_ones())
            .sum();
        let [red, green, blue] = state.color().channels();
        let [r, g, b] = state.color().swatch_rgb888();
        println!(
            "screen {}: {}x{}, {} lit pixels, backlight {}% {}% {}% (about #{:02x}{:02x}{:02x})",
            state.screen(),
            state.bitmap().width(),
            state.bitmap().height(),
            lit,
            red,
            green,
            blue,
            r,
            g,
            b
        );
    }
    0
}

fn run_defaults(args: &DefaultsArgs) -> i32 {
    let dir = Path::new(&args.dir);
    match assets::save_colors(dir, &ColorSetting::DEFAULTS) {
        Ok(()) => {
            info!("wrote factory colors to {}", dir.join(assets::COLORS_FILE).display());
            0
        }
        Err(err) => {
            error!("{}", err);
            1
        }
    }
}
