//! Conversation Transcript
//!
//! The append-only record of one conversation and the reducer that folds
//! stream events into it.
//!
//! # Invariants
//!
//! - Messages never reorder and are never deleted once appended; only the
//!   most recent message may mutate, and only while its `streaming` flag
//!   is set.
//! - At most one message is streaming at any time (the pending message),
//!   tracked by an explicit index rather than a backward scan.
//! - The conversation identity is assigned at most once, from the first
//!   server event that reports one, and is immutable afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::StreamEvent;

/// Unique message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("msg_{id}"))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque server-assigned conversation identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    /// User input
    User,
    /// Streamed service answer
    Assistant,
}

/// Structured metadata accumulated on an assistant message
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Retrieval source information from `source` events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    /// Unrecognized structured payloads, kept for forward compatibility
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    /// Source document identifier reported with the final answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Source chunk identifier reported with the final answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
}

impl MessageMetadata {
    /// Whether no metadata has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.extra.is_none()
            && self.document_id.is_none()
            && self.chunk_id.is_none()
    }
}

/// A message in the conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content; append-only while streaming, immutable after
    pub content: String,
    /// Whether the message is still receiving incremental updates
    pub streaming: bool,
    /// When the message was created (Unix timestamp ms)
    pub timestamp: u64,
    /// Accumulated metadata
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    /// Create a completed message
    pub fn new(role: MessageRole, content: String) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content,
            streaming: false,
            timestamp: now_ms(),
            metadata: MessageMetadata::default(),
        }
    }

    /// Create an empty streaming message (content filled as tokens arrive)
    pub fn streaming(role: MessageRole) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: String::new(),
            streaming: true,
            timestamp: now_ms(),
            metadata: MessageMetadata::default(),
        }
    }
}

/// Ordered sequence of messages for one conversation, plus the reducer
/// that folds [`StreamEvent`]s into it.
///
/// Serializable for export, but deliberately not deserializable: the
/// pending index is an internal invariant that only the reducer's own
/// transitions may establish.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Transcript {
    /// Conversation history, append/mutate-last only
    messages: Vec<Message>,
    /// Index of the message currently streaming, if any
    pending: Option<usize>,
    /// Server-assigned identity, set at most once
    conversation_id: Option<ConversationId>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The message currently receiving updates, if any
    #[must_use]
    pub fn pending_message(&self) -> Option<&Message> {
        self.pending.map(|idx| &self.messages[idx])
    }

    /// The server-assigned conversation identity, once known
    #[must_use]
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    /// Whether a message is currently streaming
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.pending.is_some()
    }

    /// Start a new turn: append the user message followed by a fresh
    /// pending assistant message.
    ///
    /// The caller must have finished or cancelled any previous turn; a
    /// still-pending message is finalized first to preserve the
    /// single-pending invariant.
    pub fn begin_turn(&mut self, question: &str) -> MessageId {
        if self.pending.is_some() {
            tracing::debug!("previous pending message still open at turn start; finishing it");
            self.finish_pending();
        }

        self.messages
            .push(Message::new(MessageRole::User, question.to_string()));
        let assistant = Message::streaming(MessageRole::Assistant);
        let id = assistant.id.clone();
        self.pending = Some(self.messages.len());
        self.messages.push(assistant);
        id
    }

    /// Fold one stream event into the transcript.
    ///
    /// Events arriving with no pending message are no-ops; that guards
    /// against events observed after completion.
    pub fn apply(&mut self, event: StreamEvent) {
        let Some(idx) = self.pending else {
            if !event.is_sentinel() {
                tracing::debug!(?event, "stream event with no pending message; ignoring");
            }
            return;
        };

        match event {
            StreamEvent::Token(text) | StreamEvent::Unparseable(text) => {
                self.messages[idx].content.push_str(&text);
            }
            StreamEvent::FinalAnswer {
                text,
                conversation_id,
                document_id,
                chunk_id,
            } => {
                let message = &mut self.messages[idx];
                message.content = text;
                if document_id.is_some() {
                    message.metadata.document_id = document_id;
                }
                if chunk_id.is_some() {
                    message.metadata.chunk_id = chunk_id;
                }
                if let Some(id) = conversation_id {
                    self.assign_conversation_id(ConversationId(id));
                }
                self.finish_pending();
            }
            StreamEvent::SourceMetadata(fields) => {
                merge_value(&mut self.messages[idx].metadata.source, fields);
            }
            StreamEvent::OpaqueExtra(fields) => {
                merge_value(&mut self.messages[idx].metadata.extra, fields);
            }
            StreamEvent::Sentinel => {
                self.finish_pending();
            }
        }
    }

    /// Finish the pending message in place: content unchanged, streaming
    /// cleared. No-op when nothing is pending.
    pub fn finish_pending(&mut self) {
        if let Some(idx) = self.pending.take() {
            self.messages[idx].streaming = false;
        }
    }

    /// Terminate the pending message after a transport failure.
    ///
    /// If it never received any content, the fallback notice becomes its
    /// content so the failed turn stays visible.
    pub fn fail_pending(&mut self, notice: &str) {
        if let Some(idx) = self.pending.take() {
            let message = &mut self.messages[idx];
            if message.content.is_empty() {
                message.content = notice.to_string();
            }
            message.streaming = false;
        }
    }

    /// Assign the conversation identity exactly once; later assignments
    /// with a different value are ignored.
    fn assign_conversation_id(&mut self, id: ConversationId) {
        match &self.conversation_id {
            None => {
                tracing::debug!(conversation_id = %id, "conversation identity assigned");
                self.conversation_id = Some(id);
            }
            Some(existing) if *existing != id => {
                tracing::warn!(
                    existing = %existing,
                    reported = %id,
                    "server reported a different conversation identity; keeping the first"
                );
            }
            Some(_) => {}
        }
    }
}

/// Merge structured fields into a metadata slot.
///
/// Two JSON objects merge key-by-key (later keys win); any other shape
/// replaces the slot wholesale.
fn merge_value(slot: &mut Option<Value>, fields: Value) {
    match (slot.as_mut(), fields) {
        (Some(Value::Object(existing)), Value::Object(incoming)) => {
            existing.extend(incoming);
        }
        (_, fields) => *slot = Some(fields),
    }
}

/// Current timestamp in milliseconds
fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
