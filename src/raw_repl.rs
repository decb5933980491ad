//! Device raw execution mode (spec §4.B), grounded on `enter_raw_repl_without_soft_reset`
//! / `exec_raw` / `execbuffer` in `mpr.py`.
//!
//! Raw mode is the device's non-interactive protocol: code goes in
//! terminated by `\x04`, the device replies `OK` then streams stdout then
//! `\x04` then stderr then `\x04`. This module owns only that framing; the
//! caller decides what to do with stdout/stderr (print it, buffer it, feed
//! it to a capture file).

use std::time::Duration;

use tracing::debug;

use crate::error::MprError;
use crate::serial::SerialLink;

pub const RAW_REPL_BANNER: &[u8] = b"raw REPL; CTRL-B to exit\r\n";
pub const NORMAL_PROMPT: &[u8] = b">>> ";
const ENTER_TIMEOUT: Duration = Duration::from_secs(5);
const PROMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ctrl-C, Ctrl-C, Ctrl-A: interrupt whatever is running, request raw mode.
/// Any stale output left over from whatever was running (or its
/// KeyboardInterrupt traceback) is not drained separately — `read_until`
/// accumulates and discards it as an ordinary, non-matching prefix, so the
/// banner is found regardless of what preceded it.
pub fn enter(link: &mut dyn SerialLink) -> Result<(), MprError> {
    link.write(b"\r\x03\x03")?;
    link.write(b"\r\x01")?;
    let data = link.read_until(RAW_REPL_BANNER, RAW_REPL_BANNER.len(), ENTER_TIMEOUT)?;
    if !data.ends_with(RAW_REPL_BANNER) {
        return Err(MprError::protocol("could not enter raw repl"));
    }
    debug!("entered raw repl");
    Ok(())
}

/// Ctrl-B: leave raw mode and return to the interactive `>>> ` prompt.
pub fn exit(link: &mut dyn SerialLink) -> Result<(), MprError> {
    link.write(b"\x02")?;
    link.read_until(NORMAL_PROMPT, NORMAL_PROMPT.len(), PROMPT_TIMEOUT)?;
    Ok(())
}

/// Pushes `code`, collects `OK`, streams stdout to `on_stdout` as it
/// arrives, and returns `(stdout, stderr)` once both `\x04` sentinels have
/// been seen. A non-empty `stderr` is a device-side exception; the caller
/// decides whether that's fatal.
pub fn execute(
    link: &mut dyn SerialLink,
    code: &[u8],
    mut on_stdout: impl FnMut(&[u8]),
) -> Result<(Vec<u8>, Vec<u8>), MprError> {
    send_and_ack(link, code)?;

    let mut stdout = Vec::new();
    loop {
        let byte = link
            .read_byte_timeout(Duration::from_secs(600))?
            .ok_or_else(|| MprError::protocol("timed out waiting for stdout"))?;
        if byte == 0x04 {
            break;
        }
        stdout.push(byte);
        on_stdout(&[byte]);
    }

    let stderr = link.read_until(&[0x04], 0, PROMPT_TIMEOUT)?;
    let stderr = stderr[..stderr.len() - 1].to_vec();
    Ok((stdout, stderr))
}

/// Like [`execute`] but does not wait for the output sentinels; used by the
/// Ctrl-K file-inject hotkey, which only cares that the push was accepted.
pub fn execute_no_follow(link: &mut dyn SerialLink, code: &[u8]) -> Result<(), MprError> {
    send_and_ack(link, code)
}

/// Writes `code` and waits for the `OK` ack. Uses `read_until` rather than
/// reading exactly two bytes so a banner the device prints before the ack
/// (e.g. right after `mount::soft_reset_with_mount`'s bare `\x01`, which
/// doesn't wait for the raw-repl banner before execing) is absorbed as an
/// ordinary non-matching prefix instead of corrupting the ack read.
fn send_and_ack(link: &mut dyn SerialLink, code: &[u8]) -> Result<(), MprError> {
    link.write(code)?;
    link.write(b"\x04")?;
    link.read_until(b"OK", 2, PROMPT_TIMEOUT)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::FakeSerialLink;

    #[test]
    fn enter_succeeds_when_banner_arrives() {
        let mut link = FakeSerialLink::new();
        link.push_inbound(RAW_REPL_BANNER);
        enter(&mut link).unwrap();
    }

    #[test]
    fn enter_fails_without_banner() {
        let mut link = FakeSerialLink::new();
        link.push_inbound(b"garbage");
        let err = enter(&mut link).unwrap_err();
        assert!(matches!(err, MprError::Protocol(_)));
    }

    #[test]
    fn execute_collects_stdout_and_empty_stderr() {
        let mut link = FakeSerialLink::new();
        link.push_inbound(b"OKhello\x04\x04");
        let mut seen = Vec::new();
        let (stdout, stderr) = execute(&mut link, b"print('hello')", |b| seen.extend_from_slice(b))
            .unwrap();
        assert_eq!(stdout, b"hello");
        assert_eq!(seen, b"hello");
        assert!(stderr.is_empty());
    }

    #[test]
    fn execute_surfaces_nonempty_stderr() {
        let mut link = FakeSerialLink::new();
        link.push_inbound(b"OK\x04Traceback (most recent call last):\x04");
        let (stdout, stderr) = execute(&mut link, b"1/0", |_| {}).unwrap();
        assert!(stdout.is_empty());
        assert_eq!(stderr, b"Traceback (most recent call last):");
    }

    #[test]
    fn execute_rejects_missing_ack() {
        let mut link = FakeSerialLink::new();
        link.push_inbound(b"NO\x04\x04");
        let err = execute(&mut link, b"1", |_| {}).unwrap_err();
        assert!(matches!(err, MprError::Protocol(_)));
    }
}
