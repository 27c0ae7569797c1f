//! Claude backend.
//!
//! Runs `claude -p --output-format stream-json --verbose` and decodes the
//! tagged JSON records it prints, one per line, into [`CodingEvent`]s.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use super::auth::AuthMode;
use super::env;
use super::trait_def::{Backend, BackendError};
use crate::event::{CodingEvent, EventKind};

/// Markers Claude sets for a nested session; a child `claude` refuses to
/// start when it sees them.
const NESTED_SESSION_VARS: &[&str] = &["CLAUDECODE", "CLAUDE_CODE_ENTRYPOINT"];

/// Key-based credentials; they take precedence over a subscription login.
const API_KEY_VARS: &[&str] = &[API_KEY_VAR, AUTH_TOKEN_VAR];

const OAUTH_TOKEN_VAR: &str = "CLAUDE_CODE_OAUTH_TOKEN";
const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
const AUTH_TOKEN_VAR: &str = "ANTHROPIC_AUTH_TOKEN";

/// Backend for the [Claude Code](https://docs.anthropic.com/en/docs/claude-code) CLI.
///
/// The CLI has no credential flag, so the auth mode only shapes the
/// environment: subscription mode strips API keys, API-key mode strips the
/// OAuth and bearer tokens and requires `ANTHROPIC_API_KEY`.
#[derive(Debug, Clone)]
pub struct ClaudeBackend {
    /// Path to the `claude` binary. Defaults to `"claude"` (found via `$PATH`).
    binary: String,
    auth_mode: Option<AuthMode>,
}

impl ClaudeBackend {
    pub const NAME: &'static str = "claude";
    pub const DEFAULT_BINARY: &'static str = "claude";

    /// Create a backend that will look for `claude` on `$PATH`.
    pub fn new() -> Self {
        Self::with_binary(Self::DEFAULT_BINARY)
    }

    /// Create a backend with a custom binary path.
    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            binary: path.into(),
            auth_mode: None,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn base_command(&self) -> Vec<String> {
        vec![
            self.binary.clone(),
            "-p".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ]
    }
}

impl Default for ClaudeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for ClaudeBackend {
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
        self.require_auth_mode()?;
        let mut argv = self.base_command();
        argv.push("--".to_string());
        argv.push(prompt.to_string());
        Ok(argv)
    }

    fn build_resume_command(
        &self,
        prompt: &str,
        session_id: &str,
    ) -> Result<Vec<String>, BackendError> {
        self.require_auth_mode()?;
        if session_id.is_empty() {
            return Err(BackendError::EmptySessionId);
        }
        let mut argv = self.base_command();
        argv.extend([
            "--resume".to_string(),
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
        env::strip(&mut vars, Self::NAME, NESTED_SESSION_VARS);

        match mode {
            AuthMode::Subscription => {
                env::strip(&mut vars, Self::NAME, API_KEY_VARS);
            }
            AuthMode::ApiKey => {
                let key = env::first_present(&vars, &[API_KEY_VAR]).ok_or_else(|| {
                    BackendError::MissingCredential {
                        backend: Self::NAME.to_string(),
                        var: API_KEY_VAR.to_string(),
                    }
                })?;
                // The Claude CLI prefers a bearer token over the key.
                env::strip(&mut vars, Self::NAME, &[OAUTH_TOKEN_VAR, AUTH_TOKEN_VAR]);
                vars.insert(API_KEY_VAR.to_string(), key);
            }
        }

        Ok(vars)
    }

    fn parse_line(&self, line: &str) -> Result<Option<CodingEvent>, BackendError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(record) => parse_record(&record),
            Err(e) => {
                debug!(error = %e, "skipping line that is not stream-json");
                Ok(None)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// stream-json decoding
// ---------------------------------------------------------------------------

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Non-empty `session_id` carried on a record, if any.
fn session_of(record: &Value) -> Option<&str> {
    str_field(record, "session_id").filter(|s| !s.is_empty())
}

/// Render tool output as a string: strings verbatim, arrays of text parts
/// joined by newlines, anything else as compact JSON.
fn tool_output_text(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|part| str_field(part, "text"))
                .collect();
            if texts.is_empty() {
                output.to_string()
            } else {
                texts.join("\n")
            }
        }
        other => other.to_string(),
    }
}

fn tool_name_of(record: &Value) -> &str {
    str_field(record, "name")
        .or_else(|| str_field(record, "tool"))
        .filter(|name| !name.is_empty())
        .unwrap_or("unknown")
}

fn parse_record(record: &Value) -> Result<Option<CodingEvent>, BackendError> {
    let Some(record_type) = str_field(record, "type") else {
        debug!("skipping stream-json record without a type");
        return Ok(None);
    };
    let session_id = session_of(record);

    let event = match record_type {
        // ----------------------------------------------------------------
        // system -- the init record announces the session
        // ----------------------------------------------------------------
        "system" => {
            let is_init = str_field(record, "subtype").is_none_or(|s| s == "init");
            match session_id {
                Some(id) if is_init => Some(CodingEvent::session(id)?),
                _ => None,
            }
        }

        // ----------------------------------------------------------------
        // assistant -- text blocks, or a tool invocation
        // ----------------------------------------------------------------
        "assistant" => {
            let blocks = record
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_array);
            match blocks {
                Some(blocks) => assistant_event(blocks, session_id)?,
                None => None,
            }
        }

        // ----------------------------------------------------------------
        // user -- tool results are echoed back as user content
        // ----------------------------------------------------------------
        "user" => record
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| str_field(b, "type") == Some("tool_result"))
            })
            .map(|block| {
                let output = block.get("content").unwrap_or(&Value::Null);
                CodingEvent::tool_result(tool_output_text(output))
            }),

        // ----------------------------------------------------------------
        // top-level tool records (older CLI versions)
        // ----------------------------------------------------------------
        "tool_use" => {
            let input = record.get("input").cloned();
            Some(CodingEvent::tool_call(tool_name_of(record), input)?)
        }
        "tool_result" => {
            let output = record
                .get("output")
                .or_else(|| record.get("content"))
                .unwrap_or(&Value::Null);
            let mut builder = CodingEvent::builder(EventKind::ToolResult)
                .content(tool_output_text(output));
            if let Some(name) = str_field(record, "name").filter(|n| !n.is_empty()) {
                builder = builder.tool_name(name);
            }
            Some(builder.build()?)
        }

        // ----------------------------------------------------------------
        // result -- final record, ends the stream
        // ----------------------------------------------------------------
        "result" => Some(result_event(record, session_id)?),

        // ----------------------------------------------------------------
        // error -- an error from the CLI
        // ----------------------------------------------------------------
        "error" => {
            let message = record
                .get("error")
                .and_then(|e| str_field(e, "message"))
                .or_else(|| str_field(record, "message"))
                .or_else(|| str_field(record, "error"))
                .filter(|m| !m.is_empty())
                .unwrap_or("unknown error");
            Some(CodingEvent::error(message)?)
        }

        other => {
            debug!(record_type = other, "ignoring stream-json record type");
            None
        }
    };

    Ok(event)
}

fn assistant_event(
    blocks: &[Value],
    session_id: Option<&str>,
) -> Result<Option<CodingEvent>, BackendError> {
    let texts: Vec<&str> = blocks
        .iter()
        .filter(|b| str_field(b, "type") == Some("text"))
        .filter_map(|b| str_field(b, "text"))
        .collect();

    // One line yields at most one event. Text wins over a tool call that
    // shares its message.
    if !texts.is_empty() {
        let dropped_tools = blocks
            .iter()
            .filter(|b| str_field(b, "type") == Some("tool_use"))
            .count();
        if dropped_tools > 0 {
            debug!(dropped_tools, "assistant message mixes text and tool_use; keeping text");
        }
        let mut builder = CodingEvent::builder(EventKind::Text).content(texts.concat());
        if let Some(id) = session_id {
            builder = builder.session_id(id);
        }
        return Ok(Some(builder.build()?));
    }

    let Some(tool_use) = blocks
        .iter()
        .find(|b| str_field(b, "type") == Some("tool_use"))
    else {
        // Thinking-only or empty message.
        return Ok(None);
    };

    let mut builder = CodingEvent::builder(EventKind::ToolCall).tool_name(tool_name_of(tool_use));
    if let Some(input) = tool_use.get("input") {
        builder = builder.tool_arguments(input.clone());
    }
    if let Some(id) = session_id {
        builder = builder.session_id(id);
    }
    Ok(Some(builder.build()?))
}

fn result_event(record: &Value, session_id: Option<&str>) -> Result<CodingEvent, BackendError> {
    let result_text = str_field(record, "result");
    let mut builder = CodingEvent::builder(EventKind::Done);
    if let Some(text) = result_text {
        builder = builder.content(text);
    }
    if let Some(id) = session_id {
        builder = builder.session_id(id);
    }

    let is_error = record
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if is_error {
        let message = result_text
            .filter(|t| !t.is_empty())
            .or_else(|| str_field(record, "subtype"))
            .filter(|t| !t.is_empty())
            .unwrap_or("claude reported an error");
        builder = builder.error_message(message);
    }

    Ok(builder.build()?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
