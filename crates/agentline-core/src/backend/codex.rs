//! Codex backend.
//!
//! Runs `codex exec` and decodes its human-readable progress output. Unlike
//! Claude's tagged records, Codex prints free-form lines; the interesting
//! ones carry a marker (`session id:`, `exec ... in ...`, `tokens used:`),
//! usually behind a `[timestamp]` prefix. Every other non-blank line that
//! is not part of the banner is treated as assistant text.
//!
//! The parser sees one line at a time and keeps no state between lines.

use std::collections::HashMap;

use serde_json::json;
use tracing::debug;

use super::auth::AuthMode;
use super::env;
use super::trait_def::{Backend, BackendError};
use crate::event::{CodingEvent, EventKind};

const API_KEY_VARS: &[&str] = &["OPENAI_API_KEY", "CODEX_API_KEY"];
const CODEX_API_KEY_VAR: &str = "CODEX_API_KEY";

/// Banner and configuration lines printed before the first turn.
const HEADER_PREFIXES: &[&str] = &[
    "OpenAI Codex",
    "workdir:",
    "model:",
    "provider:",
    "approval:",
    "sandbox:",
    "reasoning effort:",
    "reasoning summaries:",
];

/// Section headers; newer releases print them without a timestamp.
const SECTION_MARKERS: &[&str] = &["codex", "thinking", "User instructions:"];

/// Tool name used for shell commands Codex runs.
const EXEC_TOOL: &str = "exec";

/// Backend for the OpenAI Codex CLI (`codex exec`).
#[derive(Debug, Clone)]
pub struct CodexBackend {
    binary: String,
    auth_mode: Option<AuthMode>,
}

impl CodexBackend {
    pub const NAME: &'static str = "codex";
    pub const DEFAULT_BINARY: &'static str = "codex";

    pub fn new() -> Self {
        Self::with_binary(Self::DEFAULT_BINARY)
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            binary: path.into(),
            auth_mode: None,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn login_method(mode: AuthMode) -> &'static str {
        match mode {
            AuthMode::Subscription => "chatgpt",
            AuthMode::ApiKey => "api",
        }
    }

    fn exec_prefix(&self, mode: AuthMode) -> Vec<String> {
        vec![
            self.binary.clone(),
            "exec".to_string(),
            "--skip-git-repo-check".to_string(),
            "--color".to_string(),
            "never".to_string(),
            "-c".to_string(),
            format!("forced_login_method={}", Self::login_method(mode)),
        ]
    }
}

impl Default for CodexBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CodexBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn auth_mode(&self) -> Option<AuthMode> {
        self.auth_mode
    }

    fn set_auth_mode(&mut self, mode: AuthMode) {
        self.auth_mode = Some(mode);
    }

    fn build_command(&self, prompt: &str) -> Result<Vec<String>, BackendError> {
        let mode = self.require_auth_mode()?;
        let mut argv = self.exec_prefix(mode);
        argv.push("--".to_string());
        argv.push(prompt.to_string());
        Ok(argv)
    }

    fn build_resume_command(
        &self,
        prompt: &str,
        session_id: &str,
    ) -> Result<Vec<String>, BackendError> {
        let mode = self.require_auth_mode()?;
        if session_id.is_empty() {
            return Err(BackendError::EmptySessionId);
        }
        let mut argv = self.exec_prefix(mode);
        argv.extend([
            "resume".to_string(),
            session_id.to_string(),
            "--".to_string(),
            prompt.to_string(),
        ]);
        Ok(argv)
    }

    fn build_env_from(
        &self,
        ambient: HashMap<String, String>,
    ) -> Result<HashMap<String, String>, BackendError> {
        let mode = self.require_auth_mode()?;
        let mut vars = ambient;

        match mode {
            AuthMode::Subscription => {
                env::strip(&mut vars, Self::NAME, API_KEY_VARS);
            }
            AuthMode::ApiKey => {
                let key = env::first_present(&vars, &[CODEX_API_KEY_VAR, "OPENAI_API_KEY"])
                    .ok_or_else(|| BackendError::MissingCredential {
                        backend: Self::NAME.to_string(),
                        var: CODEX_API_KEY_VAR.to_string(),
                    })?;
                vars.insert(CODEX_API_KEY_VAR.to_string(), key);
            }
        }

        // Markers are matched against plain text.
        vars.insert("NO_COLOR".to_string(), "1".to_string());
        Ok(vars)
    }

    fn parse_line(&self, line: &str) -> Result<Option<CodingEvent>, BackendError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(None);
        }

        let (stamped, body) = split_timestamp(line);
        let body_trimmed = body.trim();

        if let Some(id) = strip_marker(body_trimmed, "session id:") {
            return match id {
                "" => Ok(None),
                id => Ok(Some(CodingEvent::session(id)?)),
            };
        }

        if let Some(count) = strip_marker(body_trimmed, "tokens used:") {
            let mut builder = CodingEvent::builder(EventKind::Done);
            if !count.is_empty() {
                builder = builder.content(count);
            }
            return Ok(Some(builder.build()?));
        }

        if let Some(message) = strip_marker(body_trimmed, "ERROR:")
            .or_else(|| strip_marker(body_trimmed, "error:"))
        {
            if message.is_empty() {
                return Ok(None);
            }
            return Ok(Some(CodingEvent::error(message)?));
        }

        if stamped {
            return stamped_event(body_trimmed);
        }

        if is_header(body_trimmed) {
            return Ok(None);
        }

        // Plain output line. Keep the newline so concatenated text reads
        // back line by line.
        Ok(Some(CodingEvent::text(format!("{line}\n"))))
    }
}

/// Split a leading `[2025-01-01T00:00:00]` prefix off a line.
///
/// Returns whether a timestamp was present and the remainder.
fn split_timestamp(line: &str) -> (bool, &str) {
    if let Some(rest) = line.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let stamp = &rest[..end];
            if stamp.starts_with(|c: char| c.is_ascii_digit()) {
                return (true, rest[end + 1..].trim_start());
            }
        }
    }
    (false, line)
}

fn strip_marker<'a>(body: &'a str, marker: &str) -> Option<&'a str> {
    body.strip_prefix(marker).map(str::trim)
}

fn is_header(body: &str) -> bool {
    (body.len() >= 4 && body.chars().all(|c| c == '-'))
        || HEADER_PREFIXES.iter().any(|p| body.starts_with(p))
        || SECTION_MARKERS.contains(&body)
}

/// Decode a timestamped progress line. Section headers (`codex`,
/// `thinking`, `User instructions:`) carry no payload of their own.
fn stamped_event(body: &str) -> Result<Option<CodingEvent>, BackendError> {
    if let Some(rest) = body.strip_prefix("exec ") {
        let (command, cwd) = match rest.rsplit_once(" in ") {
            Some((command, cwd)) => (command.trim(), Some(cwd.trim())),
            None => (rest.trim(), None),
        };
        let mut arguments = json!({ "command": command });
        if let Some(cwd) = cwd {
            arguments["cwd"] = json!(cwd);
        }
        return Ok(Some(CodingEvent::tool_call(EXEC_TOOL, Some(arguments))?));
    }

    if let Some(summary) = body.strip_suffix(':') {
        let finished = summary.contains(" succeeded in ")
            || (summary.contains(" exited ") && summary.contains(" in "));
        if finished {
            let event = CodingEvent::builder(EventKind::ToolResult)
                .tool_name(EXEC_TOOL)
                .content(summary)
                .build()?;
            return Ok(Some(event));
        }
    }

    debug!(marker = body, "ignoring codex progress marker");
    Ok(None)
}
