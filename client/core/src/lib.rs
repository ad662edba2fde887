//! Counsel Core - Streaming Client for the Counsel QA Service
//!
//! This crate is the headless client engine for counsel, a retrieval-backed
//! question-answering service. It turns the service's chunked streaming
//! responses into a live, watchable conversation transcript, completely
//! independent of any UI framework.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       UI Surfaces                            │
//! │        (terminal, web, anything that renders text)           │
//! │                           │                                  │
//! │              watch::Receiver<Transcript> (down)              │
//! │                 ChatController::send (up)                    │
//! └───────────────────────────┼──────────────────────────────────┘
//!                             │
//! ┌───────────────────────────┼──────────────────────────────────┐
//! │                    COUNSEL CORE                              │
//! │  ┌────────────────────────┴───────────────────────────────┐  │
//! │  │                   ChatController                       │  │
//! │  │  ┌──────────┐  ┌──────────┐  ┌─────────┐  ┌─────────┐  │  │
//! │  │  │  Frame   │  │  Event   │  │ Trans-  │  │  Http   │  │  │
//! │  │  │ Decoder  │  │Classifier│  │ cript   │  │Transport│  │  │
//! │  │  └──────────┘  └──────────┘  └─────────┘  └─────────┘  │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bytes flow through a fixed pipeline: the [`decoder::FrameDecoder`]
//! splits chunked bytes into frame field values, [`event::classify`]
//! turns each value into a typed [`StreamEvent`], and the
//! [`transcript::Transcript`] reducer folds events into conversation
//! state. The [`controller::ChatController`] drives the pipeline from a
//! spawned task per send and enforces that at most one stream is active.
//!
//! # Key Types
//!
//! - [`ChatController`]: starts, supersedes, and cancels streaming turns
//! - [`Transcript`]: the conversation state, published over a watch channel
//! - [`StreamEvent`]: one classified frame payload
//! - [`StreamSession`]: handle to an in-flight stream (phase + cancel)
//! - [`QaTransport`]: transport seam, implemented over HTTP by
//!   [`HttpTransport`] and by scripted streams in tests
//!
//! # Quick Start
//!
//! ```ignore
//! use counsel_core::{ChatController, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::load()?;
//!     let mut controller = ChatController::with_http(config)?;
//!     let mut transcript = controller.subscribe();
//!
//!     let mut session = controller.send("What is a lease?").await.unwrap();
//!
//!     // Render transcript updates while the answer streams in.
//!     tokio::spawn(async move {
//!         while transcript.changed().await.is_ok() {
//!             // redraw from transcript.borrow()
//!         }
//!     });
//!
//!     session.wait().await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`decoder`]: incremental frame decoding over raw byte chunks
//! - [`event`]: payload classification into typed stream events
//! - [`transcript`]: conversation state and the event reducer
//! - [`session`]: per-stream lifecycle phases and cancellation
//! - [`controller`]: the session controller tying it all together
//! - [`client`]: the QA service transport (HTTP and the test seam)
//! - [`config`]: configuration loading (file, environment, defaults)
//! - [`error`]: the error taxonomy for transport and sessions

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod event;
pub mod session;
pub mod transcript;

// Re-exports for convenience
pub use client::{ByteStream, HttpTransport, QaTransport, StreamRequest};
pub use config::{default_config_path, ClientConfig, ConfigError};
pub use controller::{ChatController, FALLBACK_NOTICE};
pub use decoder::FrameDecoder;
pub use error::StreamError;
pub use event::{classify, StreamEvent, DONE_SENTINEL};
pub use session::{SessionPhase, StreamSession};
pub use transcript::{
    ConversationId, Message, MessageId, MessageMetadata, MessageRole, Transcript,
};
