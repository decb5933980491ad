//! Compresses the device-side filesystem hook before it's pushed over the
//! wire (spec §4.F), grounded on the `re.sub` pipeline applied to
//! `fs_hook_code` in `mpr.py`. A resource-constrained MicroPython board
//! has little room for a 200-line script verbatim, so the same five
//! substitutions are applied here, in the same order, to the embedded
//! source in `assets/bootstrap.py`.

use std::sync::OnceLock;

use regex::Regex;

use crate::rpc::Cmd;

const SOURCE: &str = include_str!("../assets/bootstrap.py");

/// Returns the minified hook source, computed once and cached — it's
/// identical on every call within a process.
pub fn bootstrap_code() -> &'static str {
    static COMPRESSED: OnceLock<String> = OnceLock::new();
    COMPRESSED.get_or_init(|| compress(SOURCE))
}

/// The five-step compression: replace each `CMD_*` name with its integer
/// value, strip comments, collapse blank lines, halve four-space indents,
/// then shorten the three identifiers long enough to matter.
fn compress(src: &str) -> String {
    let mut out = src.to_string();

    for cmd in Cmd::ALL {
        let pattern = Regex::new(cmd.bootstrap_name()).unwrap();
        out = pattern
            .replace_all(&out, (cmd as u8).to_string())
            .into_owned();
    }

    out = comment_re().replace_all(&out, "").into_owned();
    out = blank_lines_re().replace_all(&out, "\n").into_owned();
    out = out.replace("    ", " ");
    out = out.replace("rd_", "r");
    out = out.replace("wr_", "w");
    out = out.replace("buf4", "b4");
    out
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m) *#.*$").unwrap())
}

fn blank_lines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\n+").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_names_are_substituted_with_integers() {
        let code = bootstrap_code();
        assert!(!code.contains("CMD_STAT"));
        assert!(code.contains(&(Cmd::Stat as u8).to_string()));
    }

    #[test]
    fn identifiers_are_shortened() {
        let code = bootstrap_code();
        assert!(!code.contains("rd_s8"));
        assert!(code.contains("rs8"));
        assert!(!code.contains("buf4"));
        assert!(code.contains("b4"));
    }

    #[test]
    fn comments_and_blank_run_are_removed() {
        let code = bootstrap_code();
        assert!(!code.contains('#'));
        assert!(!code.contains("\n\n"));
    }

    #[test]
    fn compression_is_idempotent_per_process() {
        assert_eq!(bootstrap_code(), bootstrap_code());
    }
}
