//! Printing events and run summaries to stdout.

use std::io::Write;

use anyhow::{Context, Result};
use serde_json::json;

use agentline_core::{CodingEvent, Completion, EventKind, StreamResult};

/// Longest tool output echoed in human mode.
const MAX_RESULT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Text streamed as-is, other events as bracketed one-liners.
    Human,
    /// One JSON object per line.
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Human }
    }
}

/// Writes events as they arrive.
///
/// In human mode text chunks are printed without a trailing newline, so
/// the renderer tracks whether the cursor is mid-line before printing a
/// one-liner.
pub struct EventPrinter<W: Write> {
    out: W,
    format: OutputFormat,
    mid_line: bool,
}

impl<W: Write> EventPrinter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self {
            out,
            format,
            mid_line: false,
        }
    }

    pub fn event(&mut self, event: &CodingEvent) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let line = serde_json::to_string(event).context("failed to serialize event")?;
                writeln!(self.out, "{line}")?;
            }
            OutputFormat::Human => match event.kind() {
                EventKind::Text => {
                    let text = event.content().unwrap_or_default();
                    write!(self.out, "{text}")?;
                    self.mid_line = !text.is_empty() && !text.ends_with('\n');
                }
                _ => {
                    let line = summarize_event(event);
                    if !line.is_empty() {
                        self.line(&line)?;
                    }
                }
            },
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn summary(&mut self, result: &StreamResult) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let summary = json!({
                    "summary": {
                        "completion": completion_str(result.completion()),
                        "timed_out": result.timed_out(),
                        "session_id": result.session_id(),
                        "events": result.events().len(),
                        "errors": result.errors().count(),
                        "exit_code": result.exit_status().and_then(|s| s.code()),
                    }
                });
                writeln!(self.out, "{summary}")?;
            }
            OutputFormat::Human => {
                let exit = match result.exit_status() {
                    Some(status) => status.to_string(),
                    None => "n/a".to_string(),
                };
                self.line("")?;
                writeln!(self.out, "---")?;
                writeln!(
                    self.out,
                    "session:    {}",
                    result.session_id().unwrap_or("-")
                )?;
                writeln!(self.out, "completion: {}", completion_str(result.completion()))?;
                writeln!(self.out, "timed out:  {}", result.timed_out())?;
                writeln!(self.out, "events:     {}", result.events().len())?;
                writeln!(self.out, "errors:     {}", result.errors().count())?;
                writeln!(self.out, "exit:       {exit}")?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    fn line(&mut self, line: &str) -> Result<()> {
        if self.mid_line {
            writeln!(self.out)?;
            self.mid_line = false;
        }
        if !line.is_empty() {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

pub fn completion_str(completion: Completion) -> &'static str {
    match completion {
        Completion::Done => "done",
        Completion::EndOfStream => "end_of_stream",
        Completion::TimedOut => "timed_out",
    }
}

/// One-line rendering of a non-text event; empty for a bare `done`.
fn summarize_event(event: &CodingEvent) -> String {
    match event.kind() {
        EventKind::Text => event.content().unwrap_or_default().to_string(),
        EventKind::ToolCall => {
            let name = event.tool_name().unwrap_or("?");
            match event.tool_arguments() {
                Some(args) => format!("[tool] {name} {args}"),
                None => format!("[tool] {name}"),
            }
        }
        EventKind::ToolResult => {
            let output = event.content().unwrap_or_default();
            format!("[result] {}", truncate(output.trim_end(), MAX_RESULT_CHARS))
        }
        EventKind::Session => format!("[session] {}", event.session_id().unwrap_or_default()),
        EventKind::Error => format!("[error] {}", event.error_message().unwrap_or_default()),
        EventKind::Done => match event.error_message() {
            Some(message) => format!("[done, error] {message}"),
            None => String::new(),
        },
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
