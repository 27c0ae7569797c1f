//! The normalized event vocabulary shared by every backend.
//!
//! Backends translate their tool-specific output lines into [`CodingEvent`]
//! values. The set of [`EventKind`]s is closed: an unknown kind is rejected
//! when parsed or deserialized, and an event whose fields do not fit its kind
//! cannot be constructed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of a [`CodingEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A fragment of assistant output.
    Text,
    /// The agent invoked a tool.
    ToolCall,
    /// Output returned by a tool.
    ToolResult,
    /// The backend announced its session identifier.
    Session,
    /// The backend reported an error.
    Error,
    /// Terminal event: the stream is complete.
    Done,
}

impl EventKind {
    /// Every recognized kind, in declaration order.
    pub const ALL: [EventKind; 6] = [
        EventKind::Text,
        EventKind::ToolCall,
        EventKind::ToolResult,
        EventKind::Session,
        EventKind::Error,
        EventKind::Done,
    ];

    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Text => "text",
            EventKind::ToolCall => "tool_call",
            EventKind::ToolResult => "tool_result",
            EventKind::Session => "session",
            EventKind::Error => "error",
            EventKind::Done => "done",
        }
    }

    /// Whether an event of this kind ends the stream.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventKind::Done)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EventError::UnknownKind(s.to_string()))
    }
}

/// Errors raised while constructing a [`CodingEvent`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("unknown event kind: {0:?}")]
    UnknownKind(String),

    #[error("{kind} event requires {field}")]
    MissingField { kind: EventKind, field: &'static str },

    #[error("{kind} event must not carry {field}")]
    UnexpectedField { kind: EventKind, field: &'static str },

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
}

/// Optional fields of an event, used by the per-kind validation table.
#[derive(Debug, Clone, Copy)]
enum Field {
    Content,
    ToolName,
    ToolArguments,
    SessionId,
    ErrorMessage,
}

impl Field {
    fn as_str(self) -> &'static str {
        match self {
            Field::Content => "content",
            Field::ToolName => "tool_name",
            Field::ToolArguments => "tool_arguments",
            Field::SessionId => "session_id",
            Field::ErrorMessage => "error_message",
        }
    }
}

/// `(required, forbidden)` fields for each kind.
fn field_rules(kind: EventKind) -> (&'static [Field], &'static [Field]) {
    match kind {
        EventKind::Text => (
            &[Field::Content],
            &[Field::ToolName, Field::ToolArguments, Field::ErrorMessage],
        ),
        EventKind::ToolCall => (&[Field::ToolName], &[Field::ErrorMessage]),
        EventKind::ToolResult => (
            &[Field::Content],
            &[Field::ToolArguments, Field::ErrorMessage],
        ),
        EventKind::Session => (
            &[Field::SessionId],
            &[Field::ToolName, Field::ToolArguments, Field::ErrorMessage],
        ),
        EventKind::Error => (
            &[Field::ErrorMessage],
            &[Field::ToolName, Field::ToolArguments],
        ),
        EventKind::Done => (&[], &[Field::ToolName, Field::ToolArguments]),
    }
}

/// A single normalized event produced by a backend.
///
/// Fields are private; an event is immutable once built. Use the
/// kind-specific constructors or [`CodingEvent::builder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent")]
pub struct CodingEvent {
    kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_arguments: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl CodingEvent {
    /// Start building an event of the given kind.
    pub fn builder(kind: EventKind) -> EventBuilder {
        EventBuilder {
            kind,
            content: None,
            tool_name: None,
            tool_arguments: None,
            session_id: None,
            error_message: None,
        }
    }

    /// A `text` event carrying an output fragment.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::bare(EventKind::Text)
        }
    }

    /// A `tool_result` event carrying tool output.
    pub fn tool_result(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::bare(EventKind::ToolResult)
        }
    }

    /// The terminal `done` event with no payload.
    pub fn done() -> Self {
        Self::bare(EventKind::Done)
    }

    /// A `tool_call` event. Fails if `tool_name` is empty.
    pub fn tool_call(
        tool_name: impl Into<String>,
        tool_arguments: Option<Value>,
    ) -> Result<Self, EventError> {
        let mut builder = Self::builder(EventKind::ToolCall).tool_name(tool_name);
        if let Some(arguments) = tool_arguments {
            builder = builder.tool_arguments(arguments);
        }
        builder.build()
    }

    /// A `session` event. Fails if `session_id` is empty.
    pub fn session(session_id: impl Into<String>) -> Result<Self, EventError> {
        Self::builder(EventKind::Session)
            .session_id(session_id)
            .build()
    }

    /// An `error` event. Fails if `message` is empty.
    pub fn error(message: impl Into<String>) -> Result<Self, EventError> {
        Self::builder(EventKind::Error).error_message(message).build()
    }

    fn bare(kind: EventKind) -> Self {
        Self {
            kind,
            content: None,
            tool_name: None,
            tool_arguments: None,
            session_id: None,
            error_message: None,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }

    pub fn tool_arguments(&self) -> Option<&Value> {
        self.tool_arguments.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

/// Builder for [`CodingEvent`]; validation happens in [`EventBuilder::build`].
#[derive(Debug, Clone)]
#[must_use]
pub struct EventBuilder {
    kind: EventKind,
    content: Option<String>,
    tool_name: Option<String>,
    tool_arguments: Option<Value>,
    session_id: Option<String>,
    error_message: Option<String>,
}

impl EventBuilder {
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn tool_arguments(mut self, arguments: Value) -> Self {
        self.tool_arguments = Some(arguments);
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    fn has(&self, field: Field) -> bool {
        match field {
            Field::Content => self.content.is_some(),
            Field::ToolName => self.tool_name.is_some(),
            Field::ToolArguments => self.tool_arguments.is_some(),
            Field::SessionId => self.session_id.is_some(),
            Field::ErrorMessage => self.error_message.is_some(),
        }
    }

    /// Validate the fields against the kind and produce the event.
    pub fn build(self) -> Result<CodingEvent, EventError> {
        let (required, forbidden) = field_rules(self.kind);

        if let Some(field) = forbidden.iter().find(|f| self.has(**f)) {
            return Err(EventError::UnexpectedField {
                kind: self.kind,
                field: field.as_str(),
            });
        }
        if let Some(field) = required.iter().find(|f| !self.has(**f)) {
            return Err(EventError::MissingField {
                kind: self.kind,
                field: field.as_str(),
            });
        }

        // Content may legitimately be empty (a tool with no output); the
        // identifying fields may not.
        for (field, value) in [
            (Field::ToolName, &self.tool_name),
            (Field::SessionId, &self.session_id),
            (Field::ErrorMessage, &self.error_message),
        ] {
            if value.as_deref().is_some_and(str::is_empty) {
                return Err(EventError::EmptyField {
                    field: field.as_str(),
                });
            }
        }

        Ok(CodingEvent {
            kind: self.kind,
            content: self.content,
            tool_name: self.tool_name,
            tool_arguments: self.tool_arguments,
            session_id: self.session_id,
            error_message: self.error_message,
        })
    }
}

/// Unvalidated wire shape; deserialization funnels through the builder.
#[derive(Deserialize)]
struct RawEvent {
    kind: String,
    content: Option<String>,
    tool_name: Option<String>,
    tool_arguments: Option<Value>,
    session_id: Option<String>,
    error_message: Option<String>,
}

impl TryFrom<RawEvent> for CodingEvent {
    type Error = EventError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let kind: EventKind = raw.kind.parse()?;
        EventBuilder {
            kind,
            content: raw.content,
            tool_name: raw.tool_name,
            tool_arguments: raw.tool_arguments,
            session_id: raw.session_id,
            error_message: raw.error_message,
        }
        .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_names_round_trip_through_from_str() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "thinking".parse::<EventKind>().unwrap_err();
        assert_eq!(err, EventError::UnknownKind("thinking".to_string()));
    }

    #[test]
    fn only_done_is_terminal() {
        let terminal: Vec<EventKind> = EventKind::ALL
            .into_iter()
            .filter(|k| k.is_terminal())
            .collect();
        assert_eq!(terminal, vec![EventKind::Done]);
    }

    #[test]
    fn text_constructor_keeps_content_verbatim() {
        let event = CodingEvent::text("Hello, \nworld  ");
        assert_eq!(event.kind(), EventKind::Text);
        assert_eq!(event.content(), Some("Hello, \nworld  "));
        assert!(event.tool_name().is_none());
        assert!(!event.is_terminal());
    }

    #[test]
    fn tool_call_requires_a_name() {
        let err = CodingEvent::builder(EventKind::ToolCall).build().unwrap_err();
        assert_eq!(
            err,
            EventError::MissingField {
                kind: EventKind::ToolCall,
                field: "tool_name",
            }
        );

        let err = CodingEvent::tool_call("", None).unwrap_err();
        assert_eq!(err, EventError::EmptyField { field: "tool_name" });
    }

    #[test]
    fn tool_call_with_arguments() {
        let event = CodingEvent::tool_call("Bash", Some(json!({"command": "ls"}))).unwrap();
        assert_eq!(event.tool_name(), Some("Bash"));
        assert_eq!(event.tool_arguments(), Some(&json!({"command": "ls"})));
    }

    #[test]
    fn text_with_tool_name_is_inconsistent() {
        let err = CodingEvent::builder(EventKind::Text)
            .content("hi")
            .tool_name("Bash")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            EventError::UnexpectedField {
                kind: EventKind::Text,
                field: "tool_name",
            }
        );
    }

    #[test]
    fn session_and_error_reject_empty_values() {
        assert_eq!(
            CodingEvent::session("").unwrap_err(),
            EventError::EmptyField { field: "session_id" }
        );
        assert_eq!(
            CodingEvent::error("").unwrap_err(),
            EventError::EmptyField {
                field: "error_message"
            }
        );
    }

    #[test]
    fn done_may_carry_session_and_error() {
        let event = CodingEvent::builder(EventKind::Done)
            .session_id("abc")
            .error_message("max turns reached")
            .build()
            .unwrap();
        assert!(event.is_terminal());
        assert_eq!(event.session_id(), Some("abc"));
        assert_eq!(event.error_message(), Some("max turns reached"));
    }

    #[test]
    fn tool_result_allows_empty_content() {
        let event = CodingEvent::tool_result("");
        assert_eq!(event.content(), Some(""));
    }

    #[test]
    fn serializes_flat_and_omits_absent_fields() {
        let event = CodingEvent::text("hi");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"kind": "text", "content": "hi"}));
    }

    #[test]
    fn deserialize_validates() {
        let ok: CodingEvent =
            serde_json::from_value(json!({"kind": "session", "session_id": "s-1"})).unwrap();
        assert_eq!(ok.session_id(), Some("s-1"));

        let unknown = serde_json::from_value::<CodingEvent>(json!({"kind": "thinking"}));
        assert!(unknown.is_err());

        let inconsistent =
            serde_json::from_value::<CodingEvent>(json!({"kind": "tool_call"}));
        assert!(inconsistent.is_err());
    }
}
