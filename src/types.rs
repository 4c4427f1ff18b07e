// ABOUTME: Core types for the socket bridge: errors, session context, requests, and results
// ABOUTME: Provides BridgeError, SessionContext, BridgeRequest, Completion, and the ChunkStream alias
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # Core Types
//!
//! Self-contained type definitions shared by every bridge component.
//! The HTTP layer builds a [`BridgeRequest`] and receives either a
//! [`Completion`] or a [`ChunkStream`].

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;

use crate::encoder::generate_id;

// ============================================================================
// Error Type
// ============================================================================

/// Error type for bridge operations
#[derive(Debug, Clone)]
pub struct BridgeError {
    /// Error category
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
}

/// Categories of errors produced by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Internal bridge error (bug, unexpected state)
    Internal,
    /// Upstream socket failed to open or errored mid-stream
    Transport,
    /// Configuration error
    Config,
    /// The listening phase exceeded its deadline
    Timeout,
}

impl BridgeError {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transport,
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Config,
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            message: message.into(),
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for BridgeError {}

// ============================================================================
// Message Types
// ============================================================================

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction message
    System,
    /// User input message
    User,
    /// Assistant response message
    Assistant,
}

impl MessageRole {
    /// Convert to the label used when flattening a conversation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: MessageRole,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a new chat message
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

// ============================================================================
// Session / Request Types
// ============================================================================

/// Everything the bridge needs to address one upstream session
///
/// Built by the caller after it has resolved credentials. Immutable for
/// the lifetime of one invocation.
#[derive(Clone)]
pub struct SessionContext {
    /// Upstream chat session the socket subscribes to
    pub session_id: String,
    /// Upstream account the session belongs to
    pub upstream_user_id: String,
    /// Bearer credential for both the socket and the trigger call
    pub auth_token: String,
    /// Upstream model identifier
    pub model: String,
    /// Single-turn prompt sent through the trigger
    pub prompt: String,
}

impl SessionContext {
    /// Create a session context
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        upstream_user_id: impl Into<String>,
        auth_token: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            upstream_user_id: upstream_user_id.into(),
            auth_token: auth_token.into(),
            model: model.into(),
            prompt: prompt.into(),
        }
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("upstream_user_id", &self.upstream_user_id)
            .field("auth_token", &"<redacted>")
            .field("model", &self.model)
            .field("prompt_len", &self.prompt.len())
            .finish()
    }
}

/// One inbound request handed over by the HTTP layer
#[derive(Debug, Clone)]
pub struct BridgeRequest {
    /// Identifier stamped on every chunk of this invocation
    pub request_id: String,
    /// Model name echoed back downstream
    pub model: String,
    /// Upstream session addressing and credentials
    pub session: SessionContext,
}

impl BridgeRequest {
    /// Create a request with a freshly generated `chatcmpl-` id
    ///
    /// The downstream model name defaults to the upstream one.
    #[must_use]
    pub fn new(session: SessionContext) -> Self {
        Self {
            request_id: generate_id(),
            model: session.model.clone(),
            session,
        }
    }

    /// Override the model name reported downstream
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the request id
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Prompt carried by the session context
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.session.prompt
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// How a non-streaming invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Upstream reported that generation finished
    Finished,
    /// The socket closed before completion was signalled; content may be partial
    Closed,
}

/// Aggregated result of a non-streaming invocation
#[derive(Debug, Clone)]
pub struct Completion {
    /// Request id of the invocation
    pub request_id: String,
    /// Model name reported downstream
    pub model: String,
    /// Concatenated deltas, markers included
    pub content: String,
    /// Whether upstream finished or the socket dropped first
    pub outcome: Outcome,
}

impl Completion {
    /// Whether upstream signalled completion
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.outcome == Outcome::Finished
    }
}

/// Stream of encoded SSE frames, terminated by the `[DONE]` sentinel
pub type ChunkStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;
