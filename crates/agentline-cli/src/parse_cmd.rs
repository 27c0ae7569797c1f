//! `agentline parse`: decode a captured transcript from stdin.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;

use agentline_core::{Backend, StreamReader};

use crate::render::{EventPrinter, OutputFormat};
use crate::run_cmd::report;

/// Run the parse command.
///
/// Same reader and exit codes as `run`, with stdin standing in for the
/// child's stdout.
pub async fn run_parse(
    backend: &dyn Backend,
    timeout: Duration,
    format: OutputFormat,
) -> Result<ExitCode> {
    let mut printer = EventPrinter::new(std::io::stdout().lock(), format);
    let mut render_error = None;
    let outcome = StreamReader::new(timeout)
        .read_with(tokio::io::stdin(), backend, |event| {
            if render_error.is_none() {
                render_error = printer.event(event).err();
            }
        })
        .await;
    if let Some(err) = render_error {
        return Err(err.context("failed to write event"));
    }
    report(&mut printer, outcome)
}
