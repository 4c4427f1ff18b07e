// ABOUTME: WebSocket-to-SSE bridge library for OpenAI-compatible chat completion proxies
// ABOUTME: Re-exports the bridge, its configuration, and the reconciliation building blocks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # Sockbridge: Upstream Socket to Downstream SSE
//!
//! Turns an upstream chat backend that pushes notifications over a
//! WebSocket into `chat.completion.chunk` server-sent events.
//!
//! Upstream content arrives per *kind* (`"chat"`, `"thinking"`, ...) and a
//! kind may be delivered either as growing snapshots or as deltas; the
//! mode is not announced. The [`Reconciler`] infers it per kind and only
//! ever emits the new text. Kinds configured as markable are wrapped in
//! open/close markers (`<think>` by default).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sockbridge::{Bridge, BridgeConfig, BridgeRequest, SessionContext};
//! use tokio_stream::StreamExt;
//!
//! # async fn example() -> Result<(), sockbridge::BridgeError> {
//! let bridge = Bridge::new(BridgeConfig::from_env())?;
//! let session = SessionContext::new("session-1", "user-1", "token", "GPT5", "Hello!");
//!
//! let mut chunks = bridge.stream(BridgeRequest::new(session));
//! while let Some(frame) = chunks.next().await {
//!     print!("{}", String::from_utf8_lossy(&frame));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`types`]: errors, messages, session context, requests, results
//! - [`config`]: endpoints, markers, deadlines
//! - [`prompt`]: flattening chat history into a single-turn prompt
//! - [`notification`]: decoding upstream socket payloads
//! - [`socket`]: socket connection and ordered event stream
//! - [`trigger`]: out-of-band generation trigger
//! - [`reconcile`]: snapshot/delta reconciliation and block markers
//! - [`completion`]: end-of-generation detection
//! - [`encoder`]: SSE chunk and response envelopes
//! - [`bridge`]: per-invocation orchestration

/// Core types: errors, messages, session context, requests, and results
pub mod types;

/// Bridge orchestration for streaming and non-streaming invocations
pub mod bridge;
/// Completion detection from upstream state notifications
pub mod completion;
/// Bridge configuration
pub mod config;
/// SSE chunk encoding and OpenAI-compatible envelopes
pub mod encoder;
/// Upstream notification decoding
pub mod notification;
/// Prompt construction from `ChatMessage` sequences
pub mod prompt;
/// Per-kind snapshot/delta reconciliation
pub mod reconcile;
/// Upstream socket connection and event stream
pub mod socket;
/// Generation trigger
pub mod trigger;

pub use bridge::{Bridge, SessionEnd, SessionState};
pub use completion::{CompletionDetector, StateVerdict};
pub use config::{BridgeConfig, ContentMarkers};
pub use encoder::{completion_response, ChunkEncoder, DONE_SENTINEL};
pub use notification::{ContentBuffer, Notification};
pub use prompt::flatten_messages;
pub use reconcile::{DeliveryMode, Emission, Reconciler};
pub use socket::{SocketEvent, SocketEvents};
pub use trigger::{GenerationTrigger, HttpTrigger};
pub use types::{
    BridgeError, BridgeRequest, ChatMessage, ChunkStream, Completion, ErrorKind, MessageRole,
    Outcome, SessionContext,
};
