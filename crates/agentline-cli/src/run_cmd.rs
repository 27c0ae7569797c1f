//! `agentline run`: spawn a backend, stream its events, report the outcome.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use agentline_core::{
    Backend, ReadError, SpawnRequest, StreamReader, StreamResult, spawn_backend,
};

use crate::render::{EventPrinter, OutputFormat};

/// Exit code when the deadline elapsed before the backend finished.
pub const EXIT_TIMED_OUT: u8 = 2;

pub struct RunOptions {
    pub prompt: String,
    pub resume: Option<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    pub format: OutputFormat,
}

/// Run the run command.
pub async fn run_run(backend: &dyn Backend, options: RunOptions) -> Result<ExitCode> {
    let invocation = Uuid::new_v4();
    let span = info_span!("run", %invocation, backend = backend.name());

    async move {
        let request = SpawnRequest {
            prompt: options.prompt,
            resume_session: options.resume,
            working_dir: options.cwd,
        };
        let child = spawn_backend(backend, &request)
            .with_context(|| format!("failed to start {} backend", backend.name()))?;
        info!(timeout = ?options.timeout, "reading backend output");

        let mut printer = EventPrinter::new(std::io::stdout().lock(), options.format);
        let mut render_error = None;
        let outcome = StreamReader::new(options.timeout)
            .read_child_with(child, backend, |event| {
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
    .instrument(span)
    .await
}

/// Print the summary and pick the exit code for a finished read.
pub fn report<W: std::io::Write>(
    printer: &mut EventPrinter<W>,
    outcome: Result<StreamResult, ReadError>,
) -> Result<ExitCode> {
    match outcome {
        Ok(result) => {
            printer.summary(&result)?;
            if result.timed_out() {
                Ok(ExitCode::from(EXIT_TIMED_OUT))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Err(err) => {
            printer.summary(err.partial())?;
            Err(err.into())
        }
    }
}
