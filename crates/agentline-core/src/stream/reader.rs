//! The stream reader: drives one backend invocation to completion or timeout.

use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::Child;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::decode::{DEFAULT_MAX_LINE_BYTES, StreamFault, decode_events};
use super::result::{Completion, StreamResult};
use crate::backend::{Backend, BackendError};
use crate::event::CodingEvent;
use crate::process;

/// Time a child gets between SIGTERM and SIGKILL, and to exit on its own
/// after its stream completed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// A read that failed part-way. Every variant carries what was accumulated
/// before the failure.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("backend '{backend}' failed on output line {line_number}: {source}")]
    ProtocolViolation {
        backend: String,
        line_number: usize,
        #[source]
        source: BackendError,
        partial: StreamResult,
    },

    #[error("failed to read backend output: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        partial: StreamResult,
    },

    #[error("subprocess stdout was not piped")]
    MissingStdout { partial: StreamResult },
}

impl ReadError {
    /// The result accumulated before the failure.
    pub fn partial(&self) -> &StreamResult {
        match self {
            ReadError::ProtocolViolation { partial, .. }
            | ReadError::Io { partial, .. }
            | ReadError::MissingStdout { partial } => partial,
        }
    }

    pub fn into_partial(self) -> StreamResult {
        match self {
            ReadError::ProtocolViolation { partial, .. }
            | ReadError::Io { partial, .. }
            | ReadError::MissingStdout { partial } => partial,
        }
    }
}

/// Reads a backend's output into a [`StreamResult`] under a deadline.
///
/// The deadline is required and starts when the read loop starts. Reading
/// stops at the first of: the backend's terminal `done` event, end of
/// stream, or the deadline. A line that was fully read before the deadline
/// is checked is always processed, and the deadline is checked after every
/// line, so a backend that never stops writing still times out.
#[derive(Debug, Clone, Copy)]
pub struct StreamReader {
    timeout: Duration,
    grace_period: Duration,
    max_line_bytes: usize,
}

impl StreamReader {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            grace_period: DEFAULT_GRACE_PERIOD,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Drop output lines longer than `max_line_bytes` instead of buffering
    /// them.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Read an arbitrary byte stream (no subprocess involved).
    pub async fn read<R>(&self, reader: R, backend: &dyn Backend) -> Result<StreamResult, ReadError>
    where
        R: AsyncRead + Unpin,
    {
        self.read_with(reader, backend, |_| {}).await
    }

    /// Like [`StreamReader::read`], calling `on_event` for each event as it
    /// arrives.
    pub async fn read_with<R, F>(
        &self,
        reader: R,
        backend: &dyn Backend,
        mut on_event: F,
    ) -> Result<StreamResult, ReadError>
    where
        R: AsyncRead + Unpin,
        F: FnMut(&CodingEvent),
    {
        let (result, fault) = self.pump(reader, backend, &mut on_event).await;
        finish(backend, result, fault)
    }

    /// Read a spawned child's stdout, then release the child.
    ///
    /// The child is owned for the whole call and is never left running:
    /// after a normal completion it gets the grace period to exit, after a
    /// timeout or failure it is terminated.
    pub async fn read_child(
        &self,
        child: Child,
        backend: &dyn Backend,
    ) -> Result<StreamResult, ReadError> {
        self.read_child_with(child, backend, |_| {}).await
    }

    /// Like [`StreamReader::read_child`], calling `on_event` for each event
    /// as it arrives.
    pub async fn read_child_with<F>(
        &self,
        mut child: Child,
        backend: &dyn Backend,
        mut on_event: F,
    ) -> Result<StreamResult, ReadError>
    where
        F: FnMut(&CodingEvent),
    {
        let Some(stdout) = child.stdout.take() else {
            warn!(backend = backend.name(), "child stdout was not piped; terminating");
            let mut partial = StreamResult::new();
            partial.exit_status = process::terminate(&mut child, self.grace_period).await;
            return Err(ReadError::MissingStdout { partial });
        };

        // `pump` owns stdout and closes it before returning.
        let (mut result, fault) = self.pump(stdout, backend, &mut on_event).await;

        result.exit_status = if fault.is_some() || result.timed_out() {
            process::terminate(&mut child, self.grace_period).await
        } else {
            process::reap(&mut child, self.grace_period).await
        };
        debug!(
            backend = backend.name(),
            exit_status = ?result.exit_status,
            "released child"
        );

        finish(backend, result, fault)
    }

    async fn pump<R, F>(
        &self,
        reader: R,
        backend: &dyn Backend,
        on_event: &mut F,
    ) -> (StreamResult, Option<StreamFault>)
    where
        R: AsyncRead + Unpin,
        F: FnMut(&CodingEvent),
    {
        let deadline = Instant::now() + self.timeout;

        let events = decode_events(reader, backend, self.max_line_bytes);
        tokio::pin!(events);

        let mut result = StreamResult::new();
        let fault = loop {
            // `timeout_at` polls the stream before the timer, so a line that
            // is already available wins a tie with the deadline. It also
            // polls the timer when the read used up the task's budget.
            let next = match tokio::time::timeout_at(deadline, events.next()).await {
                Ok(next) => next,
                Err(_) => {
                    self.log_timeout(backend, &result);
                    result.completion = Completion::TimedOut;
                    break None;
                }
            };

            match next {
                Some(Ok(event)) => {
                    on_event(&event);
                    if result.push(event) {
                        result.completion = Completion::Done;
                        break None;
                    }
                    // A stream that is never pending would otherwise read
                    // past the deadline.
                    if Instant::now() >= deadline {
                        self.log_timeout(backend, &result);
                        result.completion = Completion::TimedOut;
                        break None;
                    }
                }
                Some(Err(fault)) => break Some(fault),
                None => {
                    result.completion = Completion::EndOfStream;
                    break None;
                }
            }
        };

        info!(
            backend = backend.name(),
            completion = ?result.completion,
            events = result.events.len(),
            has_session = result.session_id.is_some(),
            "backend stream finished"
        );
        (result, fault)
    }

    fn log_timeout(&self, backend: &dyn Backend, result: &StreamResult) {
        warn!(
            backend = backend.name(),
            timeout = ?self.timeout,
            events = result.events.len(),
            "backend stream timed out"
        );
    }
}

fn finish(
    backend: &dyn Backend,
    result: StreamResult,
    fault: Option<StreamFault>,
) -> Result<StreamResult, ReadError> {
    match fault {
        None => Ok(result),
        Some(StreamFault::Protocol {
            line_number,
            source,
        }) => {
            warn!(
                backend = backend.name(),
                line_number,
                error = %source,
                "backend parser failed; aborting read"
            );
            Err(ReadError::ProtocolViolation {
                backend: backend.name().to_string(),
                line_number,
                source,
                partial: result,
            })
        }
        Some(StreamFault::Io(source)) => {
            warn!(backend = backend.name(), error = %source, "error reading backend output");
            Err(ReadError::Io {
                source,
                partial: result,
            })
        }
    }
}
