//! Sequential command dispatch (spec §4.H), grounded on `main()`'s
//! `while args:` loop and `command_aliases`/`cmds` tables in `mpr.py`.
//!
//! Commands are consumed left-to-right from an argv-like list. Each one
//! carries `(needs_raw_repl, is_action)`; the runner only transitions
//! raw-mode state at a boundary where the requirement actually changes.
//! If nothing in the sequence was an action, it falls through to `repl`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::console::Console;
use crate::error::MprError;
use crate::mount;
use crate::raw_repl;
use crate::repl::ReplLoop;
use crate::serial::SerialLink;

/// One step of resolved, alias-expanded argv.
#[derive(Debug, Clone)]
pub enum Command {
    Mount { path: PathBuf },
    Eval { expr: String },
    Exec { code: String },
    Run { file: PathBuf },
    Fs { args: Vec<String> },
    Repl { capture: Option<PathBuf>, inject: Option<PathBuf> },
}

impl Command {
    fn needs_raw_repl(&self) -> bool {
        !matches!(self, Command::Repl { .. })
    }

    fn is_action(&self) -> bool {
        !matches!(self, Command::Mount { .. })
    }
}

/// Expands `command_aliases`: `r` -> repl, `ls`/`cp`/`rm`/`mkdir`/`cat` ->
/// `fs <same>`, plus the two literal-argument aliases `bl` and `setrtc`.
/// `overrides` (from `.mprrc`/`.mprconfig`) is checked first, so a user can
/// redefine or add aliases without recompiling.
pub fn expand_aliases(args: &mut Vec<String>, overrides: &HashMap<String, Vec<String>>) {
    if args.is_empty() {
        return;
    }
    let replacement: Option<Vec<String>> = overrides.get(&args[0]).cloned().or_else(|| {
        match args[0].as_str() {
            "r" => Some(vec!["repl".into()]),
            "ls" => Some(vec!["fs".into(), "ls".into()]),
            "cp" => Some(vec!["fs".into(), "cp".into()]),
            "rm" => Some(vec!["fs".into(), "rm".into()]),
            "mkdir" => Some(vec!["fs".into(), "mkdir".into()]),
            "cat" => Some(vec!["fs".into(), "cat".into()]),
            "bl" => Some(vec![
                "exec".into(),
                "import machine; machine.Timer(period=1000, callback=lambda t: machine.bootloader())"
                    .into(),
            ]),
            "setrtc" => Some(vec![
                "exec".into(),
                "import machine; machine.RTC().datetime((2020, 1, 1, 0, 10, 0, 0, 0))".into(),
            ]),
            _ => None,
        }
    });
    if let Some(expansion) = replacement {
        let rest = args.split_off(1);
        *args = expansion.into_iter().chain(rest).collect();
    }
}

/// Pops one resolved [`Command`] off the front of `args`, expanding
/// aliases first. Returns `Ok(None)` once `args` is empty.
pub fn next_command(
    args: &mut Vec<String>,
    alias_overrides: &HashMap<String, Vec<String>>,
) -> Result<Option<Command>, MprError> {
    expand_aliases(args, alias_overrides);
    if args.is_empty() {
        return Ok(None);
    }
    let cmd = args.remove(0);
    let cmd = match cmd.as_str() {
        "mount" => {
            let path = take_arg(args, "mount")?;
            Command::Mount { path: PathBuf::from(path) }
        }
        "eval" => Command::Eval {
            expr: take_arg(args, "eval")?,
        },
        "exec" => Command::Exec {
            code: take_arg(args, "exec")?,
        },
        "run" => Command::Run {
            file: PathBuf::from(take_arg(args, "run")?),
        },
        "fs" => {
            if args.is_empty() {
                return Err(MprError::usage("'fs' needs at least 1 argument"));
            }
            let rest = args.split_off(0);
            Command::Fs { args: rest }
        }
        "repl" => {
            let mut capture = None;
            if args.first().map(String::as_str) == Some("--capture") {
                args.remove(0);
                capture = Some(PathBuf::from(take_arg(args, "repl --capture")?));
            }
            let inject = if args.is_empty() {
                None
            } else {
                Some(PathBuf::from(args.remove(0)))
            };
            Command::Repl { capture, inject }
        }
        other => return Err(MprError::usage(format!("'{other}' is not a command"))),
    };
    Ok(Some(cmd))
}

fn take_arg(args: &mut Vec<String>, ctx: &str) -> Result<String, MprError> {
    if args.is_empty() {
        return Err(MprError::usage(format!("'{ctx}' needs an argument")));
    }
    Ok(args.remove(0))
}

pub struct CommandRunner<'a> {
    link: &'a mut dyn SerialLink,
    in_raw_repl: bool,
    did_action: bool,
    alias_overrides: HashMap<String, Vec<String>>,
}

impl<'a> CommandRunner<'a> {
    pub fn new(link: &'a mut dyn SerialLink) -> Self {
        Self {
            link,
            in_raw_repl: false,
            did_action: false,
            alias_overrides: HashMap::new(),
        }
    }

    pub fn with_alias_overrides(mut self, overrides: HashMap<String, Vec<String>>) -> Self {
        self.alias_overrides = overrides;
        self
    }

    pub fn run_all(&mut self, mut args: Vec<String>) -> Result<(), MprError> {
        while let Some(cmd) = next_command(&mut args, &self.alias_overrides)? {
            self.transition_raw_repl(cmd.needs_raw_repl())?;
            if cmd.is_action() {
                self.did_action = true;
            }
            self.dispatch(cmd)?;
        }
        if !self.did_action {
            self.transition_raw_repl(false)?;
            self.enter_repl(None, None)?;
        }
        Ok(())
    }

    fn transition_raw_repl(&mut self, needed: bool) -> Result<(), MprError> {
        if needed && !self.in_raw_repl {
            raw_repl::enter(self.link)?;
            self.in_raw_repl = true;
        } else if !needed && self.in_raw_repl {
            raw_repl::exit(self.link)?;
            self.in_raw_repl = false;
        }
        Ok(())
    }

    fn dispatch(&mut self, cmd: Command) -> Result<(), MprError> {
        match cmd {
            Command::Mount { path } => {
                mount::mount(self.link, &path)?;
                println!("Local directory {} is mounted at /remote", path.display());
                Ok(())
            }
            Command::Exec { code } => self.execute_and_print(&code),
            Command::Eval { expr } => self.execute_and_print(&format!("print({expr})")),
            Command::Run { file } => {
                let code = std::fs::read_to_string(&file)
                    .map_err(|_| MprError::usage(format!("could not read file '{}'", file.display())))?;
                self.execute_and_print(&code)
            }
            Command::Fs { args } => crate::fs_commands::run(self.link, &args),
            Command::Repl { capture, inject } => self.enter_repl(capture.as_deref(), inject.as_deref()),
        }
    }

    fn execute_and_print(&mut self, code: &str) -> Result<(), MprError> {
        let (_stdout, stderr) = raw_repl::execute(self.link, code.as_bytes(), |b| {
            use std::io::Write;
            let _ = std::io::stdout().write_all(b);
        })?;
        if !stderr.is_empty() {
            use std::io::Write;
            let _ = std::io::stdout().flush();
            let _ = std::io::stderr().write_all(&stderr);
            raw_repl::exit(self.link)?;
            self.in_raw_repl = false;
            return Err(MprError::RemoteException(
                String::from_utf8_lossy(&stderr).into_owned(),
            ));
        }
        Ok(())
    }

    fn enter_repl(&mut self, capture: Option<&Path>, inject: Option<&Path>) -> Result<(), MprError> {
        let mount_root = self.link.mount_root().map(Path::to_path_buf);
        let mut console = crate::console::UnixConsole::enter()?;
        let mut repl = ReplLoop::new(self.link, &mut console);
        if let Some(c) = capture {
            repl = repl.with_capture(c)?;
        }
        if let Some(i) = inject {
            repl = repl.with_inject_file(i);
        }
        if let Some(root) = mount_root {
            repl = repl.with_mount_root(root);
        }
        repl.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::FakeSerialLink;

    #[test]
    fn r_alias_expands_to_repl() {
        let mut args = vec!["r".to_string()];
        expand_aliases(&mut args, &HashMap::new());
        assert_eq!(args, vec!["repl".to_string()]);
    }

    #[test]
    fn ls_alias_expands_to_fs_ls() {
        let mut args = vec!["ls".to_string(), "/".to_string()];
        expand_aliases(&mut args, &HashMap::new());
        assert_eq!(args, vec!["fs".to_string(), "ls".to_string(), "/".to_string()]);
    }

    #[test]
    fn user_override_wins_over_builtin_alias() {
        let mut overrides = HashMap::new();
        overrides.insert("ls".to_string(), vec!["exec".to_string(), "custom_ls()".to_string()]);
        let mut args = vec!["ls".to_string()];
        expand_aliases(&mut args, &overrides);
        assert_eq!(
            args,
            vec!["exec".to_string(), "custom_ls()".to_string()]
        );
    }

    #[test]
    fn unrecognized_first_token_is_left_untouched() {
        let mut args = vec!["mount".to_string(), "/tmp/x".to_string()];
        expand_aliases(&mut args, &HashMap::new());
        assert_eq!(args, vec!["mount".to_string(), "/tmp/x".to_string()]);
    }

    /// Raw-mode parity (spec §8): after dispatching an action that needs
    /// raw mode, the runner's `in_raw_repl` flag reflects the device's
    /// actual mode.
    #[test]
    fn exec_command_leaves_runner_marked_as_in_raw_repl() {
        let mut link = FakeSerialLink::new();
        link.push_inbound(raw_repl::RAW_REPL_BANNER);
        link.push_inbound(b"OK\x04\x04");

        let mut runner = CommandRunner::new(&mut link);
        runner.run_all(vec!["exec".into(), "1".into()]).unwrap();
        assert!(runner.in_raw_repl);
    }

    /// A bare `fs` invocation with no subcommand is a usage error, not a
    /// panic, and never enters raw mode.
    #[test]
    fn fs_with_no_subcommand_is_a_usage_error() {
        let mut link = FakeSerialLink::new();
        link.push_inbound(raw_repl::RAW_REPL_BANNER);
        let mut runner = CommandRunner::new(&mut link);
        let err = runner.run_all(vec!["fs".into()]).unwrap_err();
        assert!(matches!(err, MprError::UsageError(_)));
    }

    /// `mount`'s `is_action` must stay `false` (matching the original's
    /// `"mount": (True, False, 1)`): a standalone `mpr mount <dir>` is
    /// expected to fall through to the implicit `repl` that follows a
    /// sequence with no action, per spec §4.H.
    #[test]
    fn standalone_mount_is_not_an_action() {
        let mut args = vec!["mount".to_string(), "/tmp/x".to_string()];
        let cmd = next_command(&mut args, &HashMap::new()).unwrap().unwrap();
        assert!(matches!(cmd, Command::Mount { .. }));
        assert!(!cmd.is_action());
    }

    /// `repl`'s `is_action` must stay `true` (matching the original's
    /// `"repl": (False, True, 0)`): a standalone `mpr repl` must not leave
    /// `did_action` false, or the post-loop fallback in `run_all` would
    /// open a second REPL session right after the first one exits.
    #[test]
    fn standalone_repl_is_an_action() {
        let mut args = vec!["repl".to_string()];
        let cmd = next_command(&mut args, &HashMap::new()).unwrap().unwrap();
        assert!(matches!(cmd, Command::Repl { .. }));
        assert!(cmd.is_action());
    }
}
