//! Chat Controller
//!
//! Orchestrates streaming turns against the QA service: starts requests,
//! drives the decode → classify → reduce pipeline, enforces the
//! one-active-stream-per-conversation invariant, and publishes the live
//! transcript to subscribers.
//!
//! # Design Philosophy
//!
//! The controller holds no conversation data of its own beyond
//! active-session bookkeeping. All conversation state lives in the
//! [`Transcript`], mutated only from the single session task and observed
//! through `watch` channels. Presentation layers are pure renderers of
//! what the controller publishes.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::client::{HttpTransport, QaTransport, StreamRequest};
use crate::config::ClientConfig;
use crate::decoder::FrameDecoder;
use crate::error::StreamError;
use crate::event::classify;
use crate::session::{SessionPhase, StreamSession};
use crate::transcript::{ConversationId, Transcript};

/// Content given to a turn whose stream failed before producing anything
pub const FALLBACK_NOTICE: &str = "Something went wrong. Please try again.";

/// Orchestrates one conversation's streaming turns
pub struct ChatController {
    /// Transport to the QA service
    transport: Arc<dyn QaTransport>,
    /// Client configuration
    config: ClientConfig,
    /// Live transcript, published on every change
    transcript: Arc<watch::Sender<Transcript>>,
    /// Conversation identity, set at most once
    conversation: Arc<watch::Sender<Option<ConversationId>>>,
    /// The in-flight session, if any
    active: Option<StreamSession>,
}

impl ChatController {
    /// Create a controller over an arbitrary transport
    pub fn new(transport: Arc<dyn QaTransport>, config: ClientConfig) -> Self {
        let (transcript_tx, _) = watch::channel(Transcript::new());
        let (conversation_tx, _) = watch::channel(None);
        Self {
            transport,
            config,
            transcript: Arc::new(transcript_tx),
            conversation: Arc::new(conversation_tx),
            active: None,
        }
    }

    /// Create a controller talking HTTP to the configured service
    pub fn with_http(config: ClientConfig) -> Result<Self, StreamError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::new(transport, config))
    }

    /// Subscribe to the live transcript; the receiver observes every change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Transcript> {
        self.transcript.subscribe()
    }

    /// Observe the conversation identity, which becomes `Some` at most once
    #[must_use]
    pub fn conversation_id_watch(&self) -> watch::Receiver<Option<ConversationId>> {
        self.conversation.subscribe()
    }

    /// Snapshot of the current transcript
    #[must_use]
    pub fn transcript(&self) -> Transcript {
        self.transcript.borrow().clone()
    }

    /// The in-flight session handle, if a stream is active
    #[must_use]
    pub fn active_session(&self) -> Option<StreamSession> {
        self.active.as_ref().filter(|s| !s.is_finished()).cloned()
    }

    /// Cancel the in-flight stream, if any. Idempotent.
    pub fn cancel(&self) {
        if let Some(session) = &self.active {
            session.cancel();
        }
    }

    /// Send one user turn and start streaming the answer.
    ///
    /// Empty input (after trimming) is a no-op, not an error, and returns
    /// `None`. If a stream is already active it is cancelled first and
    /// its termination awaited, so two streams never interleave writes
    /// into the same pending message.
    ///
    /// The request shape is chosen once per call: no known conversation
    /// identity means a "start" request; a known one means "continue".
    pub async fn send(&mut self, text: &str) -> Option<StreamSession> {
        let question = text.trim();
        if question.is_empty() {
            return None;
        }

        if let Some(mut previous) = self.active.take() {
            if !previous.is_finished() {
                tracing::debug!("superseding active stream");
                previous.cancel();
                previous.wait().await;
            }
        }

        self.transcript.send_modify(|t| {
            t.begin_turn(question);
        });

        let request = match self.transcript.borrow().conversation_id().cloned() {
            None => StreamRequest::Start {
                question: question.to_string(),
                top_k: self.config.top_k,
            },
            Some(conversation_id) => StreamRequest::Continue {
                conversation_id,
                question: question.to_string(),
            },
        };

        let cancel = CancellationToken::new();
        let (session, phase) = StreamSession::new(cancel.clone());
        let worker = StreamWorker {
            transport: Arc::clone(&self.transport),
            request,
            transcript: Arc::clone(&self.transcript),
            conversation: Arc::clone(&self.conversation),
            cancel,
            phase,
        };
        tokio::spawn(worker.run());

        self.active = Some(session.clone());
        Some(session)
    }
}

/// One session's read loop: owns the pull over the response body and all
/// transcript mutation for that stream.
struct StreamWorker {
    transport: Arc<dyn QaTransport>,
    request: StreamRequest,
    transcript: Arc<watch::Sender<Transcript>>,
    conversation: Arc<watch::Sender<Option<ConversationId>>>,
    cancel: CancellationToken,
    phase: watch::Sender<SessionPhase>,
}

impl StreamWorker {
    async fn run(self) {
        let _ = self.phase.send(SessionPhase::AwaitingFirstByte);

        let mut stream = tokio::select! {
            () = self.cancel.cancelled() => {
                self.acknowledge_cancel();
                return;
            }
            opened = self.transport.open_stream(&self.request) => match opened {
                Ok(stream) => stream,
                Err(err) => {
                    self.fail(&err);
                    return;
                }
            },
        };

        let mut decoder = FrameDecoder::new();
        loop {
            // The only suspension point: cancellation is observed here,
            // never mid-processing.
            let chunk = tokio::select! {
                () = self.cancel.cancelled() => {
                    self.acknowledge_cancel();
                    return;
                }
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    if *self.phase.borrow() == SessionPhase::AwaitingFirstByte {
                        let _ = self.phase.send(SessionPhase::Streaming);
                    }
                    for value in decoder.push(&bytes) {
                        if self.reduce(&value) {
                            // Sentinel reduced: stop reading and drop the
                            // transport without waiting for the server to
                            // close it. Bytes after the marker are never
                            // read.
                            self.complete();
                            return;
                        }
                    }
                }
                Some(Err(err)) => {
                    self.fail(&err);
                    return;
                }
                None => break,
            }
        }

        // Byte source ended without a sentinel: flush the residual as a
        // final best-effort frame.
        for value in decoder.finish() {
            if self.reduce(&value) {
                break;
            }
        }
        self.transcript.send_modify(Transcript::finish_pending);
        self.complete();
    }

    /// Classify one field value and fold it into the transcript.
    /// Returns true when the sentinel was reduced.
    fn reduce(&self, value: &str) -> bool {
        let event = classify(value);
        let done = event.is_sentinel();
        self.transcript.send_modify(|t| t.apply(event));
        self.publish_conversation_id();
        done
    }

    /// Propagate a newly assigned conversation identity to observers,
    /// at most once.
    fn publish_conversation_id(&self) {
        let assigned = self.transcript.borrow().conversation_id().cloned();
        if let Some(id) = assigned {
            self.conversation.send_if_modified(|slot| {
                if slot.is_none() {
                    *slot = Some(id);
                    true
                } else {
                    false
                }
            });
        }
    }

    fn complete(&self) {
        let _ = self.phase.send(SessionPhase::Completed);
    }

    fn acknowledge_cancel(&self) {
        tracing::debug!("stream cancelled");
        self.transcript.send_modify(Transcript::finish_pending);
        let _ = self.phase.send(SessionPhase::Cancelled);
    }

    fn fail(&self, err: &StreamError) {
        tracing::error!(error = %err, "stream failed");
        self.transcript.send_modify(|t| t.fail_pending(FALLBACK_NOTICE));
        let _ = self.phase.send(SessionPhase::Failed(err.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ByteStream;
    use async_trait::async_trait;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Transport that replays scripted chunk sequences, one per call
    struct ScriptedTransport {
        scripts: Mutex<Vec<Vec<Bytes>>>,
        requests: Mutex<Vec<StreamRequest>>,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Vec<&'static str>>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(
                    scripts
                        .into_iter()
                        .map(|chunks| chunks.into_iter().map(Bytes::from).collect())
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<StreamRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QaTransport for ScriptedTransport {
        async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream, StreamError> {
            self.requests.lock().unwrap().push(request.clone());
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                return Err(StreamError::Http {
                    status: 500,
                    body: "script exhausted".to_string(),
                });
            }
            let chunks = scripts.remove(0);
            Ok(Box::pin(futures::stream::iter(
                chunks.into_iter().map(Ok),
            )))
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    fn controller(transport: Arc<ScriptedTransport>) -> ChatController {
        ChatController::new(transport, ClientConfig::default())
    }

    #[tokio::test]
    async fn test_empty_input_is_noop() {
        let transport = ScriptedTransport::new(vec![]);
        let mut controller = controller(Arc::clone(&transport));

        assert!(controller.send("   ").await.is_none());
        assert!(controller.transcript().messages().is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_token_stream_end_to_end() {
        let transport = ScriptedTransport::new(vec![vec![
            "data: {\"token\":\"Hi\"}\n\n",
            "data: {\"token\":\" there\"}\n\n",
            "data: [DONE]\n\n",
        ]]);
        let mut controller = controller(transport);

        let mut session = controller.send("hello").await.unwrap();
        assert_eq!(session.wait().await, SessionPhase::Completed);

        let transcript = controller.transcript();
        let answer = transcript.messages().last().unwrap();
        assert_eq!(answer.content, "Hi there");
        assert!(!answer.streaming);
    }

    #[tokio::test]
    async fn test_final_answer_assigns_identity_and_continue_is_used() {
        let transport = ScriptedTransport::new(vec![
            vec!["data: {\"final_response\":\"42\",\"conversation_id\":\"abc123\"}\n\ndata: [DONE]\n\n"],
            vec!["data: {\"token\":\"more\"}\n\ndata: [DONE]\n\n"],
        ]);
        let mut controller = controller(Arc::clone(&transport));

        let mut session = controller.send("first").await.unwrap();
        session.wait().await;

        let transcript = controller.transcript();
        assert_eq!(transcript.messages()[1].content, "42");
        assert_eq!(
            transcript.conversation_id(),
            Some(&ConversationId("abc123".to_string()))
        );
        assert_eq!(
            *controller.conversation_id_watch().borrow(),
            Some(ConversationId("abc123".to_string()))
        );

        let mut session = controller.send("second").await.unwrap();
        session.wait().await;

        let requests = transport.requests();
        assert!(matches!(requests[0], StreamRequest::Start { ref question, top_k: 1 } if question == "first"));
        assert!(matches!(
            requests[1],
            StreamRequest::Continue { ref conversation_id, .. } if conversation_id.0 == "abc123"
        ));
    }

    #[tokio::test]
    async fn test_malformed_payload_degrades_to_text() {
        let transport =
            ScriptedTransport::new(vec![vec!["data: not-json\n\ndata: [DONE]\n\n"]]);
        let mut controller = controller(transport);

        let mut session = controller.send("q").await.unwrap();
        session.wait().await;

        assert_eq!(controller.transcript().messages()[1].content, "not-json");
    }

    #[tokio::test]
    async fn test_stream_without_sentinel_flushes_residual() {
        // No trailing delimiter and no [DONE]; the residual still lands.
        let transport = ScriptedTransport::new(vec![vec!["data: {\"token\":\"tail\"}"]]);
        let mut controller = controller(transport);

        let mut session = controller.send("q").await.unwrap();
        assert_eq!(session.wait().await, SessionPhase::Completed);

        let transcript = controller.transcript();
        assert_eq!(transcript.messages()[1].content, "tail");
        assert!(!transcript.messages()[1].streaming);
    }

    #[tokio::test]
    async fn test_http_error_yields_fallback_notice_and_recovers() {
        let transport = ScriptedTransport::new(vec![]); // every open fails
        let mut controller = controller(transport);

        let mut session = controller.send("q").await.unwrap();
        let phase = session.wait().await;
        assert!(matches!(phase, SessionPhase::Failed(ref e) if e.contains("500")));

        let transcript = controller.transcript();
        assert_eq!(transcript.messages()[1].content, FALLBACK_NOTICE);
        assert!(!transcript.messages()[1].streaming);

        // The conversation stays usable for a subsequent send.
        let transport = ScriptedTransport::new(vec![vec!["data: {\"token\":\"ok\"}\n\ndata: [DONE]\n\n"]]);
        let mut controller = ChatController::new(transport, ClientConfig::default());
        let mut session = controller.send("again").await.unwrap();
        assert_eq!(session.wait().await, SessionPhase::Completed);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_after_completion() {
        let transport = ScriptedTransport::new(vec![vec!["data: [DONE]\n\n"]]);
        let mut controller = controller(transport);

        let mut session = controller.send("q").await.unwrap();
        assert_eq!(session.wait().await, SessionPhase::Completed);

        controller.cancel();
        controller.cancel();
        assert_eq!(session.phase(), SessionPhase::Completed);
        assert!(controller.active_session().is_none());
    }
}
