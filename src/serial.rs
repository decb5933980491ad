//! Byte-level full-duplex transport to the device (spec §4.A).
//!
//! `SerialLink` is kept trait-object-friendly so the rest of the engine
//! never has to know whether it's talking to a real port or a fake one in
//! tests. Only four methods are required; `read_exact`/`read_until` are
//! default methods built on top of `read_byte_timeout` so every
//! implementation gets them for free and consistently.

use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::MprError;

/// Generous default used for banner/prompt reads; `exec` from the CLI uses
/// an unbounded wait (see `raw_repl::EXEC_TIMEOUT`).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub trait SerialLink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), MprError>;

    /// Block for up to `timeout` waiting for one byte. `Ok(None)` means the
    /// timeout elapsed with no byte available; this is not itself an error,
    /// callers decide whether a timeout is fatal.
    fn read_byte_timeout(&mut self, timeout: Duration) -> Result<Option<u8>, MprError>;

    /// Non-blocking: how many bytes could be read right now.
    fn bytes_available(&mut self) -> Result<usize, MprError>;

    fn close(&mut self) -> Result<(), MprError>;

    /// Repoints whatever RPC server backs this link at a new host
    /// directory. A no-op for links with no mount RPC layer (the default);
    /// overridden by [`crate::interceptor::Interceptor`].
    fn set_mount_root(&mut self, _root: std::path::PathBuf) {}

    /// The host directory currently mounted through this link, if any.
    fn mount_root(&self) -> Option<&std::path::Path> {
        None
    }

    fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, MprError> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            match self.read_byte_timeout(timeout)? {
                Some(b) => out.push(b),
                None => {
                    return Err(MprError::protocol(format!(
                        "timed out after {} of {} bytes",
                        out.len(),
                        n
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Reads until `out` ends with `marker`, having read at least `min_bytes`.
    fn read_until(
        &mut self,
        marker: &[u8],
        min_bytes: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, MprError> {
        let mut out = Vec::new();
        loop {
            match self.read_byte_timeout(timeout)? {
                Some(b) => out.push(b),
                None => {
                    return Err(MprError::protocol(format!(
                        "timed out waiting for {:?}",
                        String::from_utf8_lossy(marker)
                    )))
                }
            }
            if out.len() >= min_bytes && out.ends_with(marker) {
                return Ok(out);
            }
        }
    }
}

/// Production transport: a blocking OS serial port.
pub struct PhysicalSerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl PhysicalSerialLink {
    pub fn open(path: &str, baud: u32) -> Result<Self, MprError> {
        let port = serialport::new(path, baud)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| MprError::protocol(format!("could not open {path}: {e}")))?;
        Ok(Self { port })
    }
}

impl SerialLink for PhysicalSerialLink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), MprError> {
        self.port.write_all(bytes).map_err(MprError::from)
    }

    fn read_byte_timeout(&mut self, timeout: Duration) -> Result<Option<u8>, MprError> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| MprError::protocol(e.to_string()))?;
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(MprError::from(e)),
        }
    }

    fn bytes_available(&mut self) -> Result<usize, MprError> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| MprError::protocol(e.to_string()))
    }

    fn close(&mut self) -> Result<(), MprError> {
        // serialport has no explicit close; dropping the handle closes the
        // fd. Flushing here surfaces a dead port as an error immediately
        // rather than silently on drop.
        self.port.flush().map_err(MprError::from)
    }
}

/// In-memory transport used by unit and integration tests: an inbound byte
/// queue the test preloads and an outbound `Vec<u8>` capturing everything
/// written.
pub struct FakeSerialLink {
    inbound: std::collections::VecDeque<u8>,
    pub outbound: Vec<u8>,
    closed: bool,
}

impl FakeSerialLink {
    pub fn new() -> Self {
        Self {
            inbound: std::collections::VecDeque::new(),
            outbound: Vec::new(),
            closed: false,
        }
    }

    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    pub fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }
}

impl Default for FakeSerialLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialLink for FakeSerialLink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), MprError> {
        if self.closed {
            return Err(MprError::from(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        self.outbound.extend_from_slice(bytes);
        Ok(())
    }

    fn read_byte_timeout(&mut self, _timeout: Duration) -> Result<Option<u8>, MprError> {
        if self.closed {
            return Err(MprError::from(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        Ok(self.inbound.pop_front())
    }

    fn bytes_available(&mut self) -> Result<usize, MprError> {
        Ok(self.inbound.len())
    }

    fn close(&mut self) -> Result<(), MprError> {
        self.closed = true;
        Ok(())
    }
}

/// Adapter exposing a `SerialLink` as `std::io::Read`/`Write` for the RPC
/// codec, which is written against the standard traits so its round-trip
/// tests can run against a plain `Cursor` too.
pub struct LinkIo<'a, L: SerialLink + ?Sized> {
    pub link: &'a mut L,
    pub timeout: Duration,
}

impl<'a, L: SerialLink + ?Sized> Read for LinkIo<'a, L> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self
            .link
            .read_exact(buf.len(), self.timeout)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl<'a, L: SerialLink + ?Sized> Write for LinkIo<'a, L> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.link
            .write(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
