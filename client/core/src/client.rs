//! QA Service Transport
//!
//! HTTP client for the streaming question-answering service, behind a
//! trait so the session controller can be driven by scripted byte
//! streams in tests.
//!
//! # Service API
//!
//! - `POST /query/stream` — start a new conversation: `{question, top_k}`
//! - `POST /chat/stream` — continue an existing one: `{conversation_id, question}`
//! - `POST /query` — one-shot, non-streaming answer
//!
//! Both streaming endpoints answer with a chunked `text/event-stream`
//! body in the frame format decoded by [`crate::decoder::FrameDecoder`].

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::StreamError;
use crate::transcript::ConversationId;

/// A stream of raw body chunks from the service
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// The outbound request shape, chosen once per send.
///
/// Whether a conversation is persisted server-side is carried by the
/// typed variant, not inferred from the shape of an identifier string.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamRequest {
    /// First turn: the server allocates a conversation and reports its
    /// identity with the final answer
    Start {
        /// The user's question
        question: String,
        /// Retrieval depth
        top_k: u32,
    },
    /// Follow-up turn bound to a known conversation
    Continue {
        /// The server-assigned conversation identity
        conversation_id: ConversationId,
        /// The user's question
        question: String,
    },
}

#[derive(Serialize)]
struct StartBody<'a> {
    question: &'a str,
    top_k: u32,
}

#[derive(Serialize)]
struct ContinueBody<'a> {
    conversation_id: &'a str,
    question: &'a str,
}

/// Transport abstraction over the QA service
///
/// Implementations open one long-lived response body per request. Tests
/// substitute scripted streams without any network.
#[async_trait]
pub trait QaTransport: Send + Sync {
    /// Open a streaming response for the given request.
    ///
    /// A non-success HTTP status resolves to [`StreamError::Http`]
    /// carrying the status and response body text.
    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream, StreamError>;

    /// Check whether the service is reachable
    async fn health_check(&self) -> bool;
}

/// HTTP transport over reqwest
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport from configuration
    pub fn new(config: &ClientConfig) -> Result<Self, StreamError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Endpoint for new conversations
    fn query_stream_url(&self) -> String {
        format!("{}/query/stream", self.base_url)
    }

    /// Endpoint for follow-up turns
    fn chat_stream_url(&self) -> String {
        format!("{}/chat/stream", self.base_url)
    }

    /// Non-streaming endpoint
    fn query_url(&self) -> String {
        format!("{}/query", self.base_url)
    }

    async fn post_stream<B: Serialize + Sync>(
        &self,
        url: String,
        body: &B,
    ) -> Result<ByteStream, StreamError> {
        let response = self
            .http_client
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream, */*")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(response.bytes_stream().map_err(StreamError::from)))
    }

    /// Ask one question without streaming, returning the raw JSON answer
    pub async fn query_once(
        &self,
        question: &str,
        top_k: u32,
    ) -> Result<serde_json::Value, StreamError> {
        let response = self
            .http_client
            .post(self.query_url())
            .json(&StartBody { question, top_k })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl QaTransport for HttpTransport {
    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream, StreamError> {
        match request {
            StreamRequest::Start { question, top_k } => {
                tracing::debug!(url = %self.query_stream_url(), "opening start stream");
                self.post_stream(
                    self.query_stream_url(),
                    &StartBody {
                        question,
                        top_k: *top_k,
                    },
                )
                .await
            }
            StreamRequest::Continue {
                conversation_id,
                question,
            } => {
                tracing::debug!(
                    url = %self.chat_stream_url(),
                    conversation_id = %conversation_id,
                    "opening continue stream"
                );
                self.post_stream(
                    self.chat_stream_url(),
                    &ContinueBody {
                        conversation_id: &conversation_id.0,
                        question,
                    },
                )
                .await
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(&self.base_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok()
    }
}
