//! Payload Classification
//!
//! Turns one decoded field value into a typed [`StreamEvent`]. This is a
//! pure function: no I/O, no suspension, no shared state. The decoder
//! hands values over in arrival order and the transcript reducer consumes
//! the resulting events in the same order.

use serde_json::Value;

/// Literal end-of-stream marker sent by the service (not JSON).
pub const DONE_SENTINEL: &str = "[DONE]";

/// A typed event classified from one frame's field value.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// One incremental fragment of the streamed answer text
    Token(String),
    /// The authoritative complete answer, superseding accumulated tokens
    FinalAnswer {
        /// The complete answer text
        text: String,
        /// Server-assigned conversation identity, if reported
        conversation_id: Option<String>,
        /// Source document identifier, if reported
        document_id: Option<String>,
        /// Source chunk identifier, if reported
        chunk_id: Option<String>,
    },
    /// Retrieval source information attached to the answer
    SourceMetadata(Value),
    /// A structured payload with no recognized field, kept for
    /// forward compatibility rather than discarded
    OpaqueExtra(Value),
    /// End-of-stream marker
    Sentinel,
    /// A payload that failed to parse; the raw text is preserved verbatim
    /// so it can still be surfaced instead of lost
    Unparseable(String),
}

impl StreamEvent {
    /// Whether this event terminates the read loop
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::Sentinel)
    }
}

/// Classify one field value into a [`StreamEvent`].
///
/// The field precedence is deliberate: a payload carrying both a terminal
/// answer and a token field is treated as terminal, since the final answer
/// supersedes incremental fragments.
#[must_use]
pub fn classify(value: &str) -> StreamEvent {
    if value == DONE_SENTINEL {
        return StreamEvent::Sentinel;
    }

    let parsed: Value = match serde_json::from_str(value) {
        Ok(parsed) => parsed,
        Err(_) => return StreamEvent::Unparseable(value.to_string()),
    };

    if let Some(text) = parsed.get("final_response") {
        return StreamEvent::FinalAnswer {
            text: value_to_text(text),
            conversation_id: string_field(&parsed, "conversation_id"),
            document_id: string_field(&parsed, "document_id"),
            chunk_id: string_field(&parsed, "chunk_id"),
        };
    }

    if let Some(token) = parsed.get("token") {
        return StreamEvent::Token(value_to_text(token));
    }

    if let Some(source) = parsed.get("source") {
        return StreamEvent::SourceMetadata(source.clone());
    }

    StreamEvent::OpaqueExtra(parsed)
}

/// Coerce a JSON value to its text form.
///
/// Strings are taken as-is; numbers, booleans and anything else fall back
/// to their JSON rendering.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Read an optional string field, leaving absent fields as `None` so the
/// reducer can distinguish "not provided" from "provided empty".
fn string_field(parsed: &Value, field: &str) -> Option<String> {
    parsed
        .get(field)
        .and_then(Value::as_str)
        .map(String::from)
}
