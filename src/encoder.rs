// ABOUTME: OpenAI-compatible wire envelopes and SSE framing for bridge output
// ABOUTME: Encodes delta and finish chunks as "data: {json}\n\n" with a [DONE] terminator
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::Serialize;

use crate::types::Completion;

/// Literal stream terminator, distinct from any content chunk
pub const DONE_SENTINEL: &str = "data: [DONE]\n\n";

/// Finish reason written on the closing chunk
pub const FINISH_STOP: &str = "stop";

/// Monotonic suffix keeping ids unique within one second
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// Streaming Response Types
// ============================================================================

/// OpenAI-compatible streaming chunk
#[derive(Debug, Serialize)]
pub struct ChatCompletionChunk {
    /// Unique response identifier (same across all chunks)
    pub id: String,
    /// Object type (always "chat.completion.chunk")
    pub object: &'static str,
    /// Unix timestamp of creation
    pub created: u64,
    /// Model reported downstream
    pub model: String,
    /// Streaming choices (always exactly one)
    pub choices: Vec<ChunkChoice>,
}

/// A single choice in a streaming chunk
#[derive(Debug, Serialize)]
pub struct ChunkChoice {
    /// Choice index (always 0)
    pub index: u32,
    /// Content delta
    pub delta: Delta,
    /// Reason the generation stopped (only on the final chunk)
    pub finish_reason: Option<String>,
    /// Always null; present for client compatibility
    pub logprobs: Option<()>,
}

/// Delta content in a streaming chunk
#[derive(Debug, Serialize)]
pub struct Delta {
    /// Role (only present on the opening chunk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    /// Content increment (omitted when empty)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

// ============================================================================
// Non-streaming Response Types
// ============================================================================

/// OpenAI-compatible chat completion response
#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    /// Unique response identifier
    pub id: String,
    /// Object type (always "chat.completion")
    pub object: &'static str,
    /// Unix timestamp of creation
    pub created: u64,
    /// Model reported downstream
    pub model: String,
    /// Response choices (always one)
    pub choices: Vec<Choice>,
    /// Token usage (upstream reports none, so always zero)
    pub usage: Usage,
}

/// A single choice in a chat completion response
#[derive(Debug, Serialize)]
pub struct Choice {
    /// Choice index (always 0)
    pub index: u32,
    /// Generated message
    pub message: ResponseMessage,
    /// Reason the generation stopped
    pub finish_reason: Option<String>,
    /// Always null
    pub logprobs: Option<()>,
}

/// Message in a chat completion response
#[derive(Debug, Serialize)]
pub struct ResponseMessage {
    /// Role (always "assistant")
    pub role: &'static str,
    /// Generated content
    pub content: String,
}

/// Token usage statistics
#[derive(Debug, Default, Serialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the completion
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode one streaming chunk as an SSE frame
///
/// An empty `delta` produces `"delta":{}`.
#[must_use]
pub fn encode_chunk(
    request_id: &str,
    model: &str,
    delta: &str,
    finish_reason: Option<&str>,
) -> Bytes {
    let chunk = ChatCompletionChunk {
        id: request_id.to_owned(),
        object: "chat.completion.chunk",
        created: unix_timestamp(),
        model: model.to_owned(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: Delta {
                role: None,
                content: (!delta.is_empty()).then(|| delta.to_owned()),
            },
            finish_reason: finish_reason.map(ToOwned::to_owned),
            logprobs: None,
        }],
    };
    frame(&chunk)
}

/// Encode the opening role announcement chunk
#[must_use]
pub fn encode_role_chunk(request_id: &str, model: &str) -> Bytes {
    let chunk = ChatCompletionChunk {
        id: request_id.to_owned(),
        object: "chat.completion.chunk",
        created: unix_timestamp(),
        model: model.to_owned(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: Delta {
                role: Some("assistant"),
                content: None,
            },
            finish_reason: None,
            logprobs: None,
        }],
    };
    frame(&chunk)
}

/// Encode the stream terminator
#[must_use]
pub const fn encode_done() -> Bytes {
    Bytes::from_static(DONE_SENTINEL.as_bytes())
}

fn frame(chunk: &ChatCompletionChunk) -> Bytes {
    let json = serde_json::to_string(chunk).unwrap_or_default();
    Bytes::from(format!("data: {json}\n\n"))
}

/// Encoder bound to one invocation's id and model
#[derive(Debug, Clone)]
pub struct ChunkEncoder {
    request_id: String,
    model: String,
}

impl ChunkEncoder {
    /// Create an encoder for one invocation
    #[must_use]
    pub fn new(request_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            model: model.into(),
        }
    }

    /// Opening role chunk
    #[must_use]
    pub fn role(&self) -> Bytes {
        encode_role_chunk(&self.request_id, &self.model)
    }

    /// Text delta chunk
    #[must_use]
    pub fn delta(&self, text: &str) -> Bytes {
        encode_chunk(&self.request_id, &self.model, text, None)
    }

    /// Closing chunk carrying `finish_reason: "stop"` and optional text
    #[must_use]
    pub fn stop(&self, text: &str) -> Bytes {
        encode_chunk(&self.request_id, &self.model, text, Some(FINISH_STOP))
    }

    /// Stream terminator
    #[must_use]
    pub const fn done(&self) -> Bytes {
        encode_done()
    }
}

/// Build the non-streaming response envelope for a completed invocation
#[must_use]
pub fn completion_response(completion: &Completion) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: completion.request_id.clone(),
        object: "chat.completion",
        created: unix_timestamp(),
        model: completion.model.clone(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant",
                content: completion.content.clone(),
            },
            finish_reason: Some(FINISH_STOP.to_owned()),
            logprobs: None,
        }],
        usage: Usage::default(),
    }
}

/// Generate a unique completion ID
pub fn generate_id() -> String {
    let ts = unix_timestamp();
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("chatcmpl-{ts:x}{seq:08x}")
}

/// Get current unix timestamp in seconds
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
