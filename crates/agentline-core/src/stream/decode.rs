//! Line-by-line decoding of a backend's output into events.

use bytes::BytesMut;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};
use tracing::{debug, warn};

use crate::backend::{Backend, BackendError};
use crate::event::CodingEvent;

/// Longest output line decoded by default. Longer lines are dropped.
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Why a decoded stream stopped early.
#[derive(Debug)]
pub enum StreamFault {
    /// The backend's parser failed on the given (1-based) line.
    Protocol {
        line_number: usize,
        source: BackendError,
    },
    /// Reading the underlying output failed.
    Io(std::io::Error),
}

/// Decode `reader` line by line through `backend`.
///
/// Yields one item per line that produced an event. Lines the backend does
/// not recognize are skipped. A parser failure or read error is yielded
/// once as `Err` and ends the stream. Lines are split on `\n` and decoded
/// lossily, so invalid UTF-8 only affects the line it appears on.
///
/// A line longer than `max_line_bytes` is discarded up to its newline
/// without being buffered; it still counts toward line numbers.
pub fn decode_events<'a, R>(
    mut reader: R,
    backend: &'a dyn Backend,
    max_line_bytes: usize,
) -> impl Stream<Item = Result<CodingEvent, StreamFault>> + 'a
where
    R: AsyncRead + Unpin + 'a,
{
    async_stream::stream! {
        let mut codec =
            AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max_line_bytes);
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut eof = false;
        let mut line_number = 0usize;

        loop {
            let frame = if eof {
                codec.decode_eof(&mut buf)
            } else {
                codec.decode(&mut buf)
            };
            let bytes = match frame {
                Ok(Some(bytes)) => bytes,
                Ok(None) if eof => return,
                Ok(None) => {
                    buf.reserve(READ_CHUNK);
                    match reader.read_buf(&mut buf).await {
                        Ok(0) => eof = true,
                        Ok(_) => {}
                        Err(e) => {
                            yield Err(StreamFault::Io(e));
                            return;
                        }
                    }
                    continue;
                }
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    line_number += 1;
                    warn!(
                        backend = backend.name(),
                        line_number,
                        max_line_bytes,
                        "dropping over-long output line"
                    );
                    continue;
                }
                Err(AnyDelimiterCodecError::Io(e)) => {
                    yield Err(StreamFault::Io(e));
                    return;
                }
            };
            line_number += 1;

            let line = String::from_utf8_lossy(&bytes);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            match backend.parse_line(line) {
                Ok(Some(event)) => yield Ok(event),
                Ok(None) => {
                    debug!(backend = backend.name(), line_number, "line produced no event");
                }
                Err(source) => {
                    yield Err(StreamFault::Protocol { line_number, source });
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::backend::ClaudeBackend;
    use crate::event::EventKind;

    #[tokio::test]
    async fn decodes_events_and_skips_noise() {
        let input = concat!(
            "{\"type\":\"system\",\"subtype\":\"init\",\"session_id\":\"s1\"}\n",
            "not json\n",
            "\n",
            "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"hi\"}]}}\r\n",
            "{\"type\":\"result\",\"result\":\"hi\"}",
        );
        let backend = ClaudeBackend::new();
        let events: Vec<_> = decode_events(input.as_bytes(), &backend, DEFAULT_MAX_LINE_BYTES)
            .collect()
            .await;

        let kinds: Vec<EventKind> = events
            .iter()
            .map(|e| e.as_ref().unwrap().kind())
            .collect();
        assert_eq!(kinds, vec![EventKind::Session, EventKind::Text, EventKind::Done]);
    }

    #[tokio::test]
    async fn invalid_utf8_only_drops_its_own_line() {
        let mut input = b"\xff\xfe garbage\n".to_vec();
        input.extend_from_slice(br#"{"type":"result","result":"ok"}"#);
        let backend = ClaudeBackend::new();
        let events: Vec<_> = decode_events(input.as_slice(), &backend, DEFAULT_MAX_LINE_BYTES)
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(events[0].as_ref().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn empty_input_yields_nothing() {
        let backend = ClaudeBackend::new();
        let events: Vec<_> = decode_events(&b""[..], &backend, DEFAULT_MAX_LINE_BYTES)
            .collect()
            .await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn over_long_line_is_dropped_and_decoding_continues() {
        let long_text = serde_json::json!({
            "type": "assistant",
            "message": {"content": [{"type": "text", "text": "x".repeat(500)}]},
        });
        let input = format!("{long_text}\n{{\"type\":\"result\",\"result\":\"ok\"}}\n");
        let backend = ClaudeBackend::new();
        let events: Vec<_> = decode_events(input.as_bytes(), &backend, 128)
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(events[0].as_ref().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn over_long_tail_without_newline_ends_cleanly() {
        let mut input = br#"{"type":"system","subtype":"init","session_id":"s1"}"#.to_vec();
        input.push(b'\n');
        input.extend(std::iter::repeat_n(b'z', 4096));
        let backend = ClaudeBackend::new();
        let events: Vec<_> = decode_events(input.as_slice(), &backend, 256).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().session_id(), Some("s1"));
    }
}
