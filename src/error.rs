//! Error taxonomy for the host<->device engine (spec §7).
//!
//! `HostFs` is intentionally absent here: RPC server errors are caught and
//! re-encoded as `-errno` on the wire inside [`crate::rpc::server`] and never
//! cross into this enum.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum MprError {
    /// The serial port disappeared or a read/write failed at the OS level.
    #[error("device disconnected: {0}")]
    Transport(#[from] io::Error),

    /// A protocol invariant was violated: missing banner, framing desync,
    /// unrecognized RPC command id, or a timed-out read.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The device wrote non-empty stderr after a raw-mode execution.
    #[error("{0}")]
    RemoteException(String),

    /// Ctrl-C during a CLI action.
    #[error("interrupted")]
    UserInterrupt,

    /// Unknown command or missing argument.
    #[error("usage error: {0}")]
    UsageError(String),
}

impl MprError {
    /// Every error kind in this enum maps to exit code 1 (spec §6); kept as
    /// a method so `main` doesn't need to match on the variant.
    pub fn exit_code(&self) -> i32 {
        1
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        MprError::Protocol(msg.into())
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        MprError::UsageError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, MprError>;
