//! Mounts a host directory onto the device at `/remote` (spec §4.F),
//! grounded on `PyboardExtended.mount_local` / `soft_reset_with_mount` in
//! `mpr.py`.
//!
//! The host-side path never crosses the wire: the device only learns a
//! boolean (`use_second_port`, always `False` here — this build doesn't
//! support the original's alternate-output-port mode). The path lives in
//! whatever [`crate::rpc::RpcServer`] backs the link (via
//! [`SerialLink::set_mount_root`]), which answers every
//! `STAT`/`OPEN`/... request relative to it.

use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::bootstrap::bootstrap_code;
use crate::error::MprError;
use crate::raw_repl;
use crate::serial::SerialLink;

pub const MOUNT_POINT: &str = "/remote";

/// Pushes the filesystem hook onto the device (idempotently — a device
/// that's already carrying `RemoteFS` from a prior mount in this session
/// is left alone), points the link's RPC server at `local_root`, then
/// mounts `/remote`.
pub fn mount(link: &mut dyn SerialLink, local_root: &Path) -> Result<(), MprError> {
    link.set_mount_root(local_root.to_path_buf());

    if !is_hook_present(link)? {
        let (_, stderr) = raw_repl::execute(link, bootstrap_code().as_bytes(), |_| {})?;
        require_empty(stderr)?;
    }
    let (_, stderr) = raw_repl::execute(link, b"__mount(False)", |_| {})?;
    require_empty(stderr)?;

    info!(root = %local_root.display(), "mounted");
    Ok(())
}

fn is_hook_present(link: &mut dyn SerialLink) -> Result<bool, MprError> {
    let (stdout, stderr) = raw_repl::execute(link, b"print(\"RemoteFS\" in globals())", |_| {})?;
    require_empty(stderr)?;
    Ok(stdout.trim_ascii() == b"True")
}

fn require_empty(stderr: Vec<u8>) -> Result<(), MprError> {
    if stderr.is_empty() {
        Ok(())
    } else {
        Err(MprError::RemoteException(
            String::from_utf8_lossy(&stderr).into_owned(),
        ))
    }
}

/// Ctrl-D during the REPL: a soft reset clears device globals, so an
/// active mount must be reinstalled afterwards. Exact mirror of
/// `soft_reset_with_mount`'s fallback to a plain reset when nothing is
/// mounted.
pub fn soft_reset_with_mount(
    link: &mut dyn SerialLink,
    local_root: Option<&Path>,
    mut out: impl FnMut(&[u8]),
) -> Result<(), MprError> {
    link.write(b"\x04")?;
    drain_reset_banner(link, &mut out)?;
    let Some(root) = local_root else {
        return Ok(());
    };
    // Nothing is running after a fresh reset, so there's nothing to
    // interrupt: re-enter raw mode with a bare Ctrl-A rather than the
    // heavier interrupt-then-wait-for-banner `raw_repl::enter` uses when a
    // previous command might still be executing.
    link.write(b"\x01")?;
    mount(link, root)?;
    raw_repl::exit(link)?;
    Ok(())
}

/// Reads the post-reset banner in full: one blocking read to get the first
/// byte, then drains whatever has arrived since in a quiet-window poll —
/// stopping only once a 100ms gap passes with nothing more to read — so a
/// multi-line banner is captured whole rather than cut at its first line.
fn drain_reset_banner(
    link: &mut dyn SerialLink,
    out: &mut impl FnMut(&[u8]),
) -> Result<(), MprError> {
    let first = link.read_exact(1, crate::serial::DEFAULT_TIMEOUT)?;
    out(&first);
    loop {
        let n = link.bytes_available()?;
        if n == 0 {
            break;
        }
        out(&link.read_exact(n, crate::serial::DEFAULT_TIMEOUT)?);
        std::thread::sleep(Duration::from_millis(100));
    }
    Ok(())
}

/// `os.umount("/remote")` on the device. Note: upstream guards the
/// unmount-on-exit call path behind a literal `if False`, so in practice
/// an active mount is simply abandoned when the process exits; this
/// function exists for the explicit `unmount` action but is never called
/// automatically on process teardown, matching that behavior.
pub fn unmount(link: &mut dyn SerialLink) -> Result<(), MprError> {
    let (_, stderr) = raw_repl::execute(
        link,
        format!("os.umount(\"{MOUNT_POINT}\")").as_bytes(),
        |_| {},
    )?;
    require_empty(stderr)
}
