//! Demultiplexes RPC frames out of the device's otherwise-passthrough
//! serial output (spec §4.E), grounded on `SerialIntercept` in
//! `mpr.py`. Bytes are inspected one at a time: `\x18 <cmd>` is consumed
//! and answered entirely internally (never surfacing to the consumer);
//! everything else is appended to a small lookahead buffer for `read_*`
//! to drain.
//!
//! `mpr.py` also strips ANSI CSI sequences when the host terminal lacks
//! native VT processing (Windows without `VT_ENABLED`). This build only
//! ships a Unix console (`crate::console`), which always has native ANSI
//! support, so stripping defaults off; it's kept working and tested so a
//! future non-Unix console can opt in with [`Interceptor::with_ansi_stripping`].

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::MprError;
use crate::rpc::{Cmd, Request, RpcServer};
use crate::serial::{LinkIo, SerialLink};

pub struct Interceptor<L> {
    link: L,
    rpc: RpcServer,
    buf: VecDeque<u8>,
    strip_ansi: bool,
}

impl<L: SerialLink> Interceptor<L> {
    pub fn new(link: L, mount_root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            link,
            rpc: RpcServer::new(mount_root),
            buf: VecDeque::new(),
            strip_ansi: false,
        }
    }

    pub fn with_ansi_stripping(mut self, enabled: bool) -> Self {
        self.strip_ansi = enabled;
        self
    }

    pub fn into_inner(self) -> L {
        self.link
    }

    fn serve_rpc_frame(&mut self, timeout: Duration) -> Result<(), MprError> {
        let cmd_byte = match self.link.read_byte_timeout(timeout)? {
            Some(b) => b,
            None => {
                // Lone trailing 0x18 with no follow-up byte before timeout:
                // flush it through literally rather than hanging or erroring.
                self.buf.push_back(0x18);
                return Ok(());
            }
        };
        let cmd = Cmd::try_from(cmd_byte)
            .map_err(|_| MprError::protocol(format!("unknown rpc command id {cmd_byte:#x}")))?;
        let req = {
            let mut io = LinkIo {
                link: &mut self.link,
                timeout,
            };
            Request::decode(cmd, &mut io)?
        };
        let reply = self.rpc.dispatch(req);
        let mut io = LinkIo {
            link: &mut self.link,
            timeout,
        };
        reply.encode(&mut io)?;
        Ok(())
    }

    fn strip_ansi_sequence(&mut self, timeout: Duration) -> Result<(), MprError> {
        let esctype = match self.link.read_byte_timeout(timeout)? {
            Some(b) => b,
            None => return Ok(()),
        };
        if esctype == b'[' {
            loop {
                match self.link.read_byte_timeout(timeout)? {
                    Some(b) if (0x40..=0x7E).contains(&b) => break,
                    Some(_) => continue,
                    None => break,
                }
            }
        }
        Ok(())
    }
}

impl<L: SerialLink> SerialLink for Interceptor<L> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), MprError> {
        self.link.write(bytes)
    }

    fn read_byte_timeout(&mut self, timeout: Duration) -> Result<Option<u8>, MprError> {
        loop {
            if let Some(b) = self.buf.pop_front() {
                return Ok(Some(b));
            }
            match self.link.read_byte_timeout(timeout)? {
                None => return Ok(None),
                Some(0x18) => self.serve_rpc_frame(timeout)?,
                Some(0x1b) if self.strip_ansi => self.strip_ansi_sequence(timeout)?,
                Some(c) => self.buf.push_back(c),
            }
        }
    }

    fn bytes_available(&mut self) -> Result<usize, MprError> {
        while self.link.bytes_available()? > 0 {
            match self.link.read_byte_timeout(Duration::from_millis(0))? {
                Some(0x18) => self.serve_rpc_frame(Duration::from_millis(0))?,
                Some(0x1b) if self.strip_ansi => {
                    self.strip_ansi_sequence(Duration::from_millis(0))?
                }
                Some(c) => self.buf.push_back(c),
                None => break,
            }
        }
        Ok(self.buf.len())
    }

    fn close(&mut self) -> Result<(), MprError> {
        self.link.close()
    }

    fn set_mount_root(&mut self, root: std::path::PathBuf) {
        self.rpc.set_mount_root(root);
    }

    fn mount_root(&self) -> Option<&std::path::Path> {
        Some(self.rpc.mount_root())
    }
}
