//! Interactive REPL multiplexer (spec §4.G), grounded on
//! `do_repl`/`do_repl_main_loop` in `mpr.py`. Ties the keyboard, the
//! device link, and an optional capture file together: keystrokes go to
//! the device unless they're one of the three hotkeys, device bytes come
//! back hex-escaped when they're not printable.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::console::Console;
use crate::error::MprError;
use crate::mount::soft_reset_with_mount;
use crate::serial::SerialLink;

const QUIT: u8 = 0x1d; // Ctrl-]
const SOFT_RESET: u8 = 0x04; // Ctrl-D
const INJECT: u8 = 0x0b; // Ctrl-K

pub struct ReplLoop<'a> {
    link: &'a mut dyn SerialLink,
    console: &'a mut dyn Console,
    capture: Option<File>,
    inject_file: Option<PathBuf>,
    mount_root: Option<PathBuf>,
}

impl<'a> ReplLoop<'a> {
    pub fn new(link: &'a mut dyn SerialLink, console: &'a mut dyn Console) -> Self {
        Self {
            link,
            console,
            capture: None,
            inject_file: None,
            mount_root: None,
        }
    }

    pub fn with_capture(mut self, path: &Path) -> Result<Self, MprError> {
        self.capture = Some(File::create(path)?);
        Ok(self)
    }

    pub fn with_inject_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.inject_file = Some(path.into());
        self
    }

    pub fn with_mount_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_root = Some(path.into());
        self
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<(), MprError> {
        self.console.write(bytes)?;
        if let Some(f) = self.capture.as_mut() {
            f.write_all(bytes)?;
        }
        Ok(())
    }

    /// Runs until Ctrl-] or the device disconnects.
    pub fn run(&mut self) -> Result<(), MprError> {
        loop {
            // Approximates the blocking select() on keyboard-fd + serial-fd
            // in the original with a short poll on the keyboard and a
            // non-blocking check of the link; avoids a true busy spin
            // while staying responsive to either source.
            crate::console::poll_readable(self.console.fd(), Duration::from_millis(10))?;

            if let Some(c) = self.console.read_nonblocking()? {
                match c {
                    QUIT => return Ok(()),
                    SOFT_RESET => {
                        // `self.link` is the only field `soft_reset_with_mount` takes
                        // positionally; borrowing `console`/`capture` separately lets the
                        // closure reach both without aliasing it, so the banner goes
                        // through the same console+capture path as `emit`.
                        let console = &mut *self.console;
                        let mut capture = self.capture.take();
                        let root = self.mount_root.clone();
                        soft_reset_with_mount(self.link, root.as_deref(), |b| {
                            let _ = console.write(b);
                            if let Some(f) = capture.as_mut() {
                                let _ = f.write_all(b);
                            }
                        })?;
                        self.capture = capture;
                    }
                    INJECT => self.inject()?,
                    other => self.link.write(&[other])?,
                }
            }

            let n = self.link.bytes_available()?;
            if n > 0 {
                let byte = self.link.read_exact(1, Duration::from_secs(1))?[0];
                self.display_byte(byte)?;
            }
        }
    }

    fn inject(&mut self) -> Result<(), MprError> {
        let Some(path) = self.inject_file.clone() else {
            return Ok(());
        };
        info!(?path, "injecting file");
        let contents = std::fs::read(&path)?;
        crate::raw_repl::enter(self.link)?;
        crate::raw_repl::execute_no_follow(self.link, &contents)?;
        crate::raw_repl::exit(self.link)?;
        Ok(())
    }

    fn display_byte(&mut self, byte: u8) -> Result<(), MprError> {
        if matches!(byte, 8 | 9 | 10 | 13 | 27) || byte >= 32 {
            self.emit(&[byte])
        } else {
            self.emit(format!("[{byte:02x}]").as_bytes())
        }
    }
}
