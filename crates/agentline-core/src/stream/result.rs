//! The aggregate outcome of reading one backend stream.

use std::process::ExitStatus;

use crate::event::{CodingEvent, EventKind};

/// How a read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The backend emitted its terminal `done` event.
    Done,
    /// The output stream closed without a terminal event.
    EndOfStream,
    /// The deadline elapsed first.
    TimedOut,
}

/// Everything accumulated from one invocation.
///
/// Built only by the [`super::StreamReader`]; read-only for callers.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamResult {
    pub(crate) events: Vec<CodingEvent>,
    pub(crate) text: String,
    pub(crate) session_id: Option<String>,
    pub(crate) completion: Completion,
    pub(crate) exit_status: Option<ExitStatus>,
}

impl StreamResult {
    pub(crate) fn new() -> Self {
        Self {
            events: Vec::new(),
            text: String::new(),
            session_id: None,
            completion: Completion::EndOfStream,
            exit_status: None,
        }
    }

    /// Append an event, folding its text and session id into the aggregate.
    ///
    /// Returns `true` if the event is terminal.
    pub(crate) fn push(&mut self, event: CodingEvent) -> bool {
        if event.kind() == EventKind::Text {
            if let Some(content) = event.content() {
                self.text.push_str(content);
            }
        }
        if self.session_id.is_none() {
            if let Some(id) = event.session_id().filter(|id| !id.is_empty()) {
                self.session_id = Some(id.to_string());
            }
        }
        let terminal = event.is_terminal();
        self.events.push(event);
        terminal
    }

    /// Events in arrival order.
    pub fn events(&self) -> &[CodingEvent] {
        &self.events
    }

    /// Concatenation of every `text` event's content, in arrival order.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The first non-empty session id seen on any event.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }

    pub fn timed_out(&self) -> bool {
        self.completion == Completion::TimedOut
    }

    /// Exit status of the subprocess, when the reader owned and reaped one.
    ///
    /// A non-zero status is not an error here; interpreting it is up to the
    /// caller.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Backend-reported `error` events.
    pub fn errors(&self) -> impl Iterator<Item = &CodingEvent> {
        self.events.iter().filter(|e| e.kind() == EventKind::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_text(content: &str, session: &str) -> CodingEvent {
        CodingEvent::builder(EventKind::Text)
            .content(content)
            .session_id(session)
            .build()
            .unwrap()
    }

    #[test]
    fn push_accumulates_text_in_order() {
        let mut result = StreamResult::new();
        result.push(CodingEvent::text("Hello, "));
        result.push(CodingEvent::tool_result("ignored"));
        result.push(CodingEvent::text("world"));
        assert_eq!(result.text(), "Hello, world");
        assert_eq!(result.events().len(), 3);
    }

    #[test]
    fn first_session_id_sticks() {
        let mut result = StreamResult::new();
        result.push(CodingEvent::text("no session"));
        result.push(session_text("a", "first"));
        result.push(CodingEvent::session("second").unwrap());
        assert_eq!(result.session_id(), Some("first"));
    }

    #[test]
    fn push_reports_terminal_events() {
        let mut result = StreamResult::new();
        assert!(!result.push(CodingEvent::text("x")));
        assert!(result.push(CodingEvent::done()));
    }

    #[test]
    fn new_result_is_an_untimed_end_of_stream() {
        let result = StreamResult::new();
        assert_eq!(result.completion(), Completion::EndOfStream);
        assert!(!result.timed_out());
        assert!(result.events().is_empty());
        assert!(result.exit_status().is_none());
    }

    #[test]
    fn errors_filters_error_events() {
        let mut result = StreamResult::new();
        result.push(CodingEvent::text("x"));
        result.push(CodingEvent::error("boom").unwrap());
        let errors: Vec<_> = result.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_message(), Some("boom"));
    }
}
