//! Bodies of the `fs <subcmd>` action (SPEC_FULL §4, "fs subcommand
//! bodies"). These operate on the device's own onboard filesystem, not on
//! a host directory mounted at `/remote` — unlike [`crate::mount`], no RPC
//! server is involved. Each subcommand is a short Python snippet pushed
//! through [`crate::raw_repl::execute`], mirroring how `fs_hook_code`
//! itself leans on the `os` module for the same operations.

use crate::error::MprError;
use crate::raw_repl;
use crate::serial::SerialLink;

pub fn run(link: &mut dyn SerialLink, args: &[String]) -> Result<(), MprError> {
    let Some((subcmd, rest)) = args.split_first() else {
        return Err(MprError::usage("'fs' needs at least 1 argument"));
    };
    let code = match subcmd.as_str() {
        "ls" => {
            let path = rest.first().map(String::as_str).unwrap_or("/");
            format!(
                "import os\nfor _n in os.ilistdir({path:?}):\n print(_n[0], end='\\r\\n')"
            )
        }
        "cat" => {
            let path = require_one(rest, "cat")?;
            format!(
                "with open({path:?}) as _f:\n import sys\n sys.stdout.write(_f.read())"
            )
        }
        "rm" => {
            let path = require_one(rest, "rm")?;
            format!("import os\nos.remove({path:?})")
        }
        "mkdir" => {
            let path = require_one(rest, "mkdir")?;
            format!("import os\nos.mkdir({path:?})")
        }
        "cp" => {
            if rest.len() < 2 {
                return Err(MprError::usage("'fs cp' needs a source and destination"));
            }
            let (src, dst) = (&rest[0], &rest[1]);
            format!(
                "with open({src:?}) as _s, open({dst:?}, 'w') as _d:\n _d.write(_s.read())"
            )
        }
        other => return Err(MprError::usage(format!("'fs {other}' is not a command"))),
    };

    let (_stdout, stderr) = raw_repl::execute(link, code.as_bytes(), |b| {
        use std::io::Write;
        let _ = std::io::stdout().write_all(b);
    })?;
    if !stderr.is_empty() {
        return Err(MprError::RemoteException(
            String::from_utf8_lossy(&stderr).into_owned(),
        ));
    }
    Ok(())
}

fn require_one<'a>(args: &'a [String], cmd: &str) -> Result<&'a str, MprError> {
    args.first()
        .map(String::as_str)
        .ok_or_else(|| MprError::usage(format!("'fs {cmd}' needs a path argument")))
}
