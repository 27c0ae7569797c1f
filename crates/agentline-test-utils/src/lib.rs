//! Shared test utilities for agentline tests.
//!
//! Provides stand-ins for the real agent CLIs: [`FakeCli`] writes an
//! executable `/bin/sh` script into a temporary directory, and the
//! [`claude`] / [`codex`] modules build the output lines those tools print.
//! The scripts only work on unix hosts.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// An executable shell script standing in for an agent CLI.
///
/// The script and its directory are removed when the value is dropped.
pub struct FakeCli {
    dir: TempDir,
    path: PathBuf,
}

impl FakeCli {
    /// Write `#!/bin/sh` followed by `body` to `<tmp>/<name>` and make it
    /// executable.
    pub fn new(name: &str, body: &str) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir for fake cli");
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("failed to write fake cli");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("failed to make fake cli executable");
        }

        Self { dir, path }
    }

    /// A script that prints each of `lines` and exits.
    pub fn emitting(name: &str, lines: &[String]) -> Self {
        Self::new(name, &print_lines(lines))
    }

    /// A script that prints each of `lines` and then hangs until killed.
    pub fn emitting_then_hanging(name: &str, lines: &[String]) -> Self {
        Self::new(name, &format!("{}exec sleep 3600\n", print_lines(lines)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The script path as a `&str`, the form backends take as a binary.
    pub fn path_str(&self) -> &str {
        self.path.to_str().expect("temp path is not valid UTF-8")
    }

    /// The temporary directory holding the script.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Quote `s` for inclusion in a `/bin/sh` script.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn print_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| format!("printf '%s\\n' {}\n", shell_quote(line)))
        .collect()
}

/// Whether a process with this pid still exists (zombies included).
#[cfg(unix)]
pub fn process_exists(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 performs the existence check only.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Lines in Claude's `--output-format stream-json` format.
pub mod claude {
    use serde_json::json;

    pub fn system_init(session_id: &str) -> String {
        json!({"type": "system", "subtype": "init", "session_id": session_id, "tools": []})
            .to_string()
    }

    pub fn assistant_text(text: &str, session_id: &str) -> String {
        json!({
            "type": "assistant",
            "message": {"role": "assistant", "content": [{"type": "text", "text": text}]},
            "session_id": session_id,
        })
        .to_string()
    }

    pub fn tool_use(name: &str, input: serde_json::Value) -> String {
        json!({
            "type": "assistant",
            "message": {"content": [{"type": "tool_use", "id": "toolu_01", "name": name, "input": input}]},
        })
        .to_string()
    }

    pub fn tool_result(output: &str) -> String {
        json!({
            "type": "user",
            "message": {"content": [{"type": "tool_result", "tool_use_id": "toolu_01", "content": output}]},
        })
        .to_string()
    }

    pub fn result(text: &str, session_id: &str) -> String {
        json!({
            "type": "result",
            "subtype": "success",
            "is_error": false,
            "result": text,
            "session_id": session_id,
        })
        .to_string()
    }
}

/// Lines in `codex exec`'s human-readable progress format.
pub mod codex {
    const STAMP: &str = "[2025-08-01T10:00:00]";

    /// The banner `codex exec` prints before the first turn.
    pub fn banner(session_id: &str) -> Vec<String> {
        vec![
            format!("{STAMP} OpenAI Codex v0.20.0 (research preview)"),
            "--------".to_string(),
            "workdir: /work/repo".to_string(),
            "model: gpt-5".to_string(),
            "provider: openai".to_string(),
            "approval: never".to_string(),
            "sandbox: read-only".to_string(),
            format!("session id: {session_id}"),
            "--------".to_string(),
        ]
    }

    pub fn section(name: &str) -> String {
        format!("{STAMP} {name}")
    }

    pub fn exec(command: &str, cwd: &str) -> String {
        format!("{STAMP} exec {command} in {cwd}")
    }

    pub fn exec_succeeded(command: &str) -> String {
        format!("{STAMP} {command} succeeded in 12ms:")
    }

    pub fn tokens_used(count: u64) -> String {
        format!("{STAMP} tokens used: {count}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("plain"), "'plain'");
    }

    #[cfg(unix)]
    #[test]
    fn fake_cli_prints_lines_verbatim() {
        let lines = vec!["{\"a\":\"it's\"}".to_string(), "  spaced  ".to_string()];
        let cli = FakeCli::emitting("fake", &lines);
        let out = std::process::Command::new(cli.path()).output().unwrap();
        let stdout = String::from_utf8(out.stdout).unwrap();
        assert_eq!(stdout, "{\"a\":\"it's\"}\n  spaced  \n");
    }

    #[cfg(unix)]
    #[test]
    fn process_exists_for_self() {
        assert!(process_exists(std::process::id()));
    }
}
