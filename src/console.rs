//! Raw-mode keyboard console for the REPL multiplexer (spec §4.G),
//! grounded on `ConsolePosix` in `mpr.py`. Only a Unix console is
//! implemented; `ConsoleWindows`'s `msvcrt`/VT-mode dance has no
//! equivalent in this build.

use std::io::{self, Read, Write};
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::error::MprError;

pub trait Console {
    /// Returns the next typed byte if one is already available, without
    /// blocking.
    fn read_nonblocking(&mut self) -> Result<Option<u8>, MprError>;
    fn write(&mut self, bytes: &[u8]) -> Result<(), MprError>;
    fn fd(&self) -> RawFd;
}

pub struct UnixConsole {
    infd: RawFd,
    orig_attr: libc::termios,
}

impl UnixConsole {
    pub fn enter() -> Result<Self, MprError> {
        let infd = io::stdin().as_raw_fd_compat();
        let orig_attr = tcgetattr(infd)?;

        let mut attr = orig_attr;
        attr.c_iflag &= !(libc::BRKINT | libc::ICRNL | libc::INPCK | libc::ISTRIP | libc::IXON);
        attr.c_oflag = 0;
        attr.c_cflag = (attr.c_cflag & !(libc::CSIZE | libc::PARENB)) | libc::CS8;
        attr.c_lflag = 0;
        attr.c_cc[libc::VMIN] = 1;
        attr.c_cc[libc::VTIME] = 0;
        tcsetattr(infd, &attr)?;

        Ok(Self { infd, orig_attr })
    }
}

impl Drop for UnixConsole {
    fn drop(&mut self) {
        let _ = tcsetattr(self.infd, &self.orig_attr);
    }
}

impl Console for UnixConsole {
    fn read_nonblocking(&mut self) -> Result<Option<u8>, MprError> {
        if !poll_readable(self.infd, Duration::from_millis(0))? {
            return Ok(None);
        }
        let mut buf = [0u8; 1];
        match io::stdin().read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) => Err(MprError::from(e)),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), MprError> {
        io::stdout().write_all(bytes)?;
        io::stdout().flush()?;
        Ok(())
    }

    fn fd(&self) -> RawFd {
        self.infd
    }
}

fn tcgetattr(fd: RawFd) -> Result<libc::termios, MprError> {
    unsafe {
        let mut attr: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut attr) != 0 {
            return Err(MprError::from(io::Error::last_os_error()));
        }
        Ok(attr)
    }
}

fn tcsetattr(fd: RawFd, attr: &libc::termios) -> Result<(), MprError> {
    unsafe {
        if libc::tcsetattr(fd, libc::TCSANOW, attr) != 0 {
            return Err(MprError::from(io::Error::last_os_error()));
        }
    }
    Ok(())
}

/// `select()` on a single fd with a short timeout, used both for
/// nonblocking keyboard polls and the combined keyboard+serial wait in
/// the REPL main loop.
pub fn poll_readable(fd: RawFd, timeout: Duration) -> Result<bool, MprError> {
    unsafe {
        let mut set: libc::fd_set = std::mem::zeroed();
        libc::FD_ZERO(&mut set);
        libc::FD_SET(fd, &mut set);
        let mut tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };
        let rc = libc::select(fd + 1, &mut set, std::ptr::null_mut(), std::ptr::null_mut(), &mut tv);
        if rc < 0 {
            return Err(MprError::from(io::Error::last_os_error()));
        }
        Ok(rc > 0)
    }
}

trait AsRawFdCompat {
    fn as_raw_fd_compat(&self) -> RawFd;
}

impl AsRawFdCompat for io::Stdin {
    fn as_raw_fd_compat(&self) -> RawFd {
        use std::os::unix::io::AsRawFd;
        self.as_raw_fd()
    }
}
