use std::{fs, io::Write, path::Path, thread};

use kiilcd_core::preview::{BAUD, PreviewCommand, USB_PID, USB_VID};
use log::{info, trace};

/// Device node the keyboard's console usually shows up as.
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// Writer over an already-configured serial device. The port has to be set
/// up for 115200 8N1 beforehand; this only pushes command bytes and keeps
/// the per-command settle times the device needs.
pub struct SerialLink {
    port: fs::File,
}

impl SerialLink {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        info!(
            "opening {} (expecting the {:04x}:{:04x} console at {} baud)",
            path.display(),
            USB_VID,
            USB_PID,
            BAUD
        );
        let port = fs::OpenOptions::new().write(true).open(path)?;
        Ok(Self { port })
    }

    /// Send one command and wait out its settle time.
    pub fn send(&mut self, command: &PreviewCommand) -> std::io::Result<()> {
        trace!("sending {:?}", command.text);
        self.port.write_all(command.text.as_bytes())?;
        self.port.flush()?;
        thread::sleep(command.settle);
        Ok(())
    }

    pub fn send_all(&mut self, commands: &[PreviewCommand]) -> std::io::Result<()> {
        for command in commands {
            self.send(command)?;
        }
        Ok(())
    }
}
