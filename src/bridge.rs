// ABOUTME: Orchestrates one bridge invocation: socket, trigger, reconciliation, and completion
// ABOUTME: Exposes streaming (SSE chunk stream) and non-streaming (aggregated string) entry points
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # Bridge
//!
//! [`Bridge::stream`] and [`Bridge::complete`] share one listening loop.
//! Every socket event goes through [`SessionState::handle`], a synchronous
//! state machine combining the [`Reconciler`] and the
//! [`CompletionDetector`]; the loop only decides where rendered text goes
//! and when to stop.

use std::future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::completion::{CompletionDetector, StateVerdict};
use crate::config::{BridgeConfig, ContentMarkers};
use crate::encoder::ChunkEncoder;
use crate::notification::{self, Notification};
use crate::reconcile::{Emission, Reconciler};
use crate::socket::{self, SocketEvent, SocketEvents};
use crate::trigger::{spawn_trigger, GenerationTrigger, HttpTrigger};
use crate::types::{BridgeError, BridgeRequest, ChunkStream, Completion, Outcome};

/// Why a listening loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Upstream reported completion after producing content
    Finished,
    /// The socket closed before completion was reported
    Closed,
    /// The socket failed
    Failed(String),
    /// The listening deadline passed
    TimedOut,
    /// The downstream reader went away
    Cancelled,
}

/// Result of handling one socket event
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Step {
    /// Output to write, in order
    pub emissions: Vec<Emission>,
    /// Set when the event ends the session
    pub end: Option<SessionEnd>,
}

impl Step {
    fn emit(emissions: Vec<Emission>) -> Self {
        Self {
            emissions,
            end: None,
        }
    }

    fn ending(closing: Option<Emission>, end: SessionEnd) -> Self {
        Self {
            emissions: closing.into_iter().collect(),
            end: Some(end),
        }
    }
}

/// Per-invocation state machine over socket events
#[derive(Debug)]
pub struct SessionState {
    reconciler: Reconciler,
    detector: CompletionDetector,
}

impl SessionState {
    /// Create fresh state using the configured markable kinds
    #[must_use]
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            reconciler: Reconciler::new(config.markable_kinds.iter().cloned()),
            detector: CompletionDetector::new(),
        }
    }

    /// Handle one socket event
    pub fn handle(&mut self, event: SocketEvent) -> Step {
        match event {
            SocketEvent::Message(text) => self.handle_message(&text),
            SocketEvent::Close => Step::ending(self.reconciler.finish(), SessionEnd::Closed),
            SocketEvent::Error(cause) => {
                Step::ending(self.reconciler.finish(), SessionEnd::Failed(cause))
            }
        }
    }

    /// Close a block left open when the session is cut short
    pub fn finish(&mut self) -> Option<Emission> {
        self.reconciler.finish()
    }

    /// Reconciler state, for inspection
    #[must_use]
    pub const fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    fn handle_message(&mut self, text: &str) -> Step {
        match notification::decode(text) {
            Some(Notification::Update(buffer)) => {
                self.detector.record_update();
                let emissions = buffer
                    .map(|b| self.reconciler.apply(&b))
                    .unwrap_or_default();
                Step::emit(emissions)
            }
            Some(Notification::State { in_progress }) => match self.detector.on_state(in_progress)
            {
                StateVerdict::Finish => {
                    Step::ending(self.reconciler.finish(), SessionEnd::Finished)
                }
                StateVerdict::Continue => Step::default(),
            },
            Some(Notification::Other) | None => Step::default(),
        }
    }
}

// ============================================================================
// Downstream sinks
// ============================================================================

/// Where rendered text goes
#[async_trait]
trait Downstream: Send {
    /// Write one piece of text; `false` means the reader is gone
    async fn write(&mut self, text: &str) -> bool;

    /// Resolves once the reader is gone
    async fn gone(&self);
}

/// Streaming sink: one SSE chunk per emission
struct ChunkSink {
    tx: mpsc::Sender<Bytes>,
    encoder: ChunkEncoder,
}

#[async_trait]
impl Downstream for ChunkSink {
    async fn write(&mut self, text: &str) -> bool {
        self.tx.send(self.encoder.delta(text)).await.is_ok()
    }

    async fn gone(&self) {
        self.tx.closed().await;
    }
}

/// Non-streaming sink: concatenates everything
#[derive(Default)]
struct TextSink {
    content: String,
}

#[async_trait]
impl Downstream for TextSink {
    async fn write(&mut self, text: &str) -> bool {
        self.content.push_str(text);
        true
    }

    async fn gone(&self) {
        future::pending::<()>().await;
    }
}

/// Next socket event, or `None` once the deadline passes
async fn next_event(events: &mut SocketEvents, deadline: Option<Instant>) -> Option<SocketEvent> {
    let next = async { events.next().await.unwrap_or(SocketEvent::Close) };
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, next).await.ok(),
        None => Some(next.await),
    }
}

/// Drive a session until it ends
async fn listen<D: Downstream>(
    events: &mut SocketEvents,
    state: &mut SessionState,
    markers: &ContentMarkers,
    deadline: Option<Instant>,
    downstream: &mut D,
) -> SessionEnd {
    loop {
        let event = tokio::select! {
            biased;
            () = downstream.gone() => return SessionEnd::Cancelled,
            event = next_event(events, deadline) => event,
        };

        let step = match event {
            Some(event) => state.handle(event),
            None => Step::ending(state.finish(), SessionEnd::TimedOut),
        };

        for emission in &step.emissions {
            if !downstream.write(emission.render(markers)).await {
                return SessionEnd::Cancelled;
            }
        }
        if let Some(end) = step.end {
            return end;
        }
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Upstream-socket to downstream-SSE bridge
///
/// Cheap to clone; each call to [`stream`](Self::stream) or
/// [`complete`](Self::complete) owns its socket and reconciliation state.
#[derive(Clone)]
pub struct Bridge {
    config: Arc<BridgeConfig>,
    trigger: Arc<dyn GenerationTrigger>,
}

impl Bridge {
    /// Create a bridge that triggers generation over HTTP
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the trigger's HTTP client cannot be built.
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        let trigger = HttpTrigger::new(&config)?;
        Ok(Self::with_trigger(config, Arc::new(trigger)))
    }

    /// Create a bridge with a custom generation trigger
    #[must_use]
    pub fn with_trigger(config: BridgeConfig, trigger: Arc<dyn GenerationTrigger>) -> Self {
        Self {
            config: Arc::new(config),
            trigger,
        }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Stream one invocation as SSE chunks
    ///
    /// Never fails up front: transport problems surface as a final error
    /// chunk. The stream always ends with a `stop` chunk and `[DONE]`,
    /// unless the reader drops it first, which closes the upstream socket.
    /// Must be called within a tokio runtime.
    pub fn stream(&self, request: BridgeRequest) -> ChunkStream {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        tokio::spawn(run_stream(
            Arc::clone(&self.config),
            Arc::clone(&self.trigger),
            request,
            tx,
        ));
        Box::pin(ReceiverStream::new(rx))
    }

    /// Run one invocation to completion and return the aggregated text
    ///
    /// # Errors
    ///
    /// Returns a `Transport` error when the socket cannot be opened or
    /// fails mid-stream and a `Timeout` error when the deadline passes.
    /// A socket that closes before completion is not an error; the
    /// partial text comes back with [`Outcome::Closed`].
    pub async fn complete(&self, request: BridgeRequest) -> Result<Completion, BridgeError> {
        let BridgeRequest {
            request_id,
            model,
            session,
        } = request;
        let session = Arc::new(session);

        info!(
            request_id = %request_id,
            session_id = %session.session_id,
            "Starting non-streaming bridge invocation"
        );

        let mut conn = socket::connect(&self.config, &session).await?;
        spawn_trigger(Arc::clone(&self.trigger), Arc::clone(&session));

        let mut state = SessionState::new(&self.config);
        let mut sink = TextSink::default();
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let end = listen(
            conn.events(),
            &mut state,
            &self.config.markers,
            deadline,
            &mut sink,
        )
        .await;
        conn.close().await;

        let outcome = match end {
            SessionEnd::Finished => Outcome::Finished,
            SessionEnd::Closed => {
                warn!(
                    request_id = %request_id,
                    content_len = sink.content.len(),
                    "Upstream socket closed before completion; returning partial content"
                );
                Outcome::Closed
            }
            SessionEnd::Failed(cause) => {
                error!(request_id = %request_id, error = %cause, "Upstream socket failed");
                return Err(BridgeError::transport(format!(
                    "Upstream socket error: {cause}"
                )));
            }
            SessionEnd::TimedOut => {
                return Err(BridgeError::timeout(format!(
                    "No completion from upstream within {}s",
                    self.config.timeout.map_or(0, |t| t.as_secs())
                )));
            }
            SessionEnd::Cancelled => {
                return Err(BridgeError::internal("Non-streaming invocation cancelled"));
            }
        };

        info!(
            request_id = %request_id,
            content_len = sink.content.len(),
            outcome = ?outcome,
            "Bridge invocation complete"
        );

        Ok(Completion {
            request_id,
            model,
            content: sink.content,
            outcome,
        })
    }
}

/// Body of the task spawned by [`Bridge::stream`]
async fn run_stream(
    config: Arc<BridgeConfig>,
    trigger: Arc<dyn GenerationTrigger>,
    request: BridgeRequest,
    tx: mpsc::Sender<Bytes>,
) {
    let BridgeRequest {
        request_id,
        model,
        session,
    } = request;
    let session = Arc::new(session);
    let encoder = ChunkEncoder::new(&request_id, &model);

    info!(
        request_id = %request_id,
        session_id = %session.session_id,
        "Starting streaming bridge invocation"
    );

    if tx.send(encoder.role()).await.is_err() {
        debug!(request_id = %request_id, "Reader gone before first chunk");
        return;
    }

    let connected = tokio::select! {
        biased;
        () = tx.closed() => None,
        result = socket::connect(&config, &session) => Some(result),
    };
    let mut conn = match connected {
        Some(Ok(conn)) => conn,
        Some(Err(e)) => {
            error!(request_id = %request_id, error = %e, "Upstream socket unavailable");
            let _ = tx.send(encoder.stop(&format!("Error: {}", e.message))).await;
            let _ = tx.send(encoder.done()).await;
            return;
        }
        None => {
            info!(request_id = %request_id, "Reader disconnected during socket handshake");
            return;
        }
    };

    // Generation must not start for a reader that is already gone
    if tx.is_closed() {
        info!(request_id = %request_id, "Reader disconnected; upstream socket closed");
        conn.close().await;
        return;
    }
    spawn_trigger(trigger, Arc::clone(&session));

    let mut state = SessionState::new(&config);
    let mut sink = ChunkSink { tx, encoder };
    let deadline = config.timeout.map(|t| Instant::now() + t);
    let end = listen(
        conn.events(),
        &mut state,
        &config.markers,
        deadline,
        &mut sink,
    )
    .await;
    conn.close().await;

    let ChunkSink { tx, encoder } = sink;
    match end {
        SessionEnd::Finished => {
            info!(request_id = %request_id, "Upstream generation finished");
        }
        SessionEnd::Closed => {
            warn!(
                request_id = %request_id,
                "Upstream socket closed before completion; ending stream"
            );
        }
        SessionEnd::TimedOut => {
            warn!(request_id = %request_id, "Listening deadline passed; ending stream");
        }
        SessionEnd::Failed(cause) => {
            error!(request_id = %request_id, error = %cause, "Upstream socket failed mid-stream");
            let _ = tx.send(encoder.stop(&format!("Error: {cause}"))).await;
            let _ = tx.send(encoder.done()).await;
            return;
        }
        SessionEnd::Cancelled => {
            info!(request_id = %request_id, "Reader disconnected; upstream socket closed");
            return;
        }
    }

    let _ = tx.send(encoder.stop("")).await;
    let _ = tx.send(encoder.done()).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_tungstenite::tungstenite::protocol::Message;
    use tokio_tungstenite::tungstenite::Error as WsError;

    use super::*;

    fn update(kind: &str, content: &str) -> String {
        let buffer = serde_json::json!({ "type": kind, "content": content }).to_string();
        serde_json::json!({ "type": "update", "buffer": buffer }).to_string()
    }

    fn state_msg(in_progress: bool) -> String {
        serde_json::json!({ "type": "state", "state": { "inProgress": in_progress } }).to_string()
    }

    fn run(events: Vec<SocketEvent>) -> (Vec<Emission>, Option<SessionEnd>) {
        let mut state = SessionState::new(&BridgeConfig::default());
        let mut out = Vec::new();
        for event in events {
            let step = state.handle(event);
            out.extend(step.emissions);
            if step.end.is_some() {
                return (out, step.end);
            }
        }
        (out, None)
    }

    fn msg(text: String) -> SocketEvent {
        SocketEvent::Message(text)
    }

    fn text(s: &str) -> Emission {
        Emission::Text(s.to_owned())
    }

    #[test]
    fn snapshot_chat_then_finish() {
        let (out, end) = run(vec![
            msg(update("chat", "Hi")),
            msg(update("chat", "Hi there")),
            msg(state_msg(false)),
        ]);
        assert_eq!(out, vec![text("Hi"), text(" there")]);
        assert_eq!(end, Some(SessionEnd::Finished));
    }

    #[test]
    fn thinking_block_then_answer() {
        let (out, end) = run(vec![
            msg(update("thinking", "Let")),
            msg(update("thinking", "Let me think")),
            msg(update("chat", "Answer")),
            msg(state_msg(false)),
        ]);
        assert_eq!(
            out,
            vec![
                Emission::Open,
                text("Let"),
                text(" me think"),
                Emission::Close,
                text("Answer"),
            ]
        );
        assert_eq!(end, Some(SessionEnd::Finished));
    }

    #[test]
    fn idle_before_updates_keeps_waiting_then_close() {
        let (out, end) = run(vec![msg(state_msg(false)), SocketEvent::Close]);
        assert!(out.is_empty());
        assert_eq!(end, Some(SessionEnd::Closed));
    }

    #[test]
    fn idle_before_updates_does_not_block_later_content() {
        let (out, end) = run(vec![
            msg(state_msg(false)),
            msg(state_msg(true)),
            msg(update("chat", "late")),
            msg(state_msg(false)),
        ]);
        assert_eq!(out, vec![text("late")]);
        assert_eq!(end, Some(SessionEnd::Finished));
    }

    #[test]
    fn invalid_buffer_is_dropped_and_processing_continues() {
        let bad = serde_json::json!({ "type": "update", "buffer": "{oops" }).to_string();
        let (out, end) = run(vec![
            msg(bad),
            msg(update("chat", "ok")),
            msg(state_msg(false)),
        ]);
        assert_eq!(out, vec![text("ok")]);
        assert_eq!(end, Some(SessionEnd::Finished));
    }

    #[test]
    fn malformed_update_still_arms_completion() {
        let bad = serde_json::json!({ "type": "update", "buffer": "{oops" }).to_string();
        let (out, end) = run(vec![msg(bad), msg(state_msg(false))]);
        assert!(out.is_empty());
        assert_eq!(end, Some(SessionEnd::Finished));
    }

    #[test]
    fn garbage_frames_are_ignored() {
        let (out, end) = run(vec![
            msg("not json".to_owned()),
            msg(r#"{"type":"heartbeat"}"#.to_owned()),
            msg(update("chat", "x")),
        ]);
        assert_eq!(out, vec![text("x")]);
        assert_eq!(end, None);
    }

    #[test]
    fn finish_closes_open_thinking_block() {
        let (out, end) = run(vec![msg(update("thinking", "hmm")), msg(state_msg(false))]);
        assert_eq!(out, vec![Emission::Open, text("hmm"), Emission::Close]);
        assert_eq!(end, Some(SessionEnd::Finished));
    }

    #[test]
    fn socket_error_closes_block_and_fails() {
        let (out, end) = run(vec![
            msg(update("thinking", "hmm")),
            SocketEvent::Error("reset".to_owned()),
        ]);
        assert_eq!(out, vec![Emission::Open, text("hmm"), Emission::Close]);
        assert_eq!(end, Some(SessionEnd::Failed("reset".to_owned())));
    }

    fn frames(messages: Vec<String>) -> SocketEvents {
        let frames: Vec<Result<Message, WsError>> = messages
            .into_iter()
            .map(|m| Ok(Message::Text(m.into())))
            .collect();
        SocketEvents::from_frames(futures_util::stream::iter(frames))
    }

    #[tokio::test]
    async fn listen_renders_markers_into_text() {
        let config = BridgeConfig::default().with_markers("[[", "]]");
        let mut events = frames(vec![
            update("thinking", "a"),
            update("thinking", "ab"),
            update("chat", "c"),
            state_msg(false),
        ]);
        let mut state = SessionState::new(&config);
        let mut sink = TextSink::default();
        let end = listen(&mut events, &mut state, &config.markers, None, &mut sink).await;
        assert_eq!(end, SessionEnd::Finished);
        assert_eq!(sink.content, "[[ab]]c");
    }

    #[tokio::test(start_paused = true)]
    async fn listen_times_out_and_closes_block() {
        let config = BridgeConfig::default();
        let frames = futures_util::stream::iter(vec![Ok::<_, WsError>(Message::Text(
            update("thinking", "stuck").into(),
        ))])
        .chain(futures_util::stream::pending());
        let mut events = SocketEvents::from_frames(frames);
        let mut state = SessionState::new(&config);
        let mut sink = TextSink::default();
        let deadline = Some(Instant::now() + Duration::from_secs(5));
        let end = listen(&mut events, &mut state, &config.markers, deadline, &mut sink).await;
        assert_eq!(end, SessionEnd::TimedOut);
        assert_eq!(sink.content, "<think>\nstuck\n</think>\n\n");
    }

    #[tokio::test]
    async fn listen_stops_when_reader_is_gone() {
        let config = BridgeConfig::default();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut sink = ChunkSink {
            tx,
            encoder: ChunkEncoder::new("id", "m"),
        };
        let mut events = frames(vec![update("chat", "x")]);
        let mut state = SessionState::new(&config);
        let end = listen(&mut events, &mut state, &config.markers, None, &mut sink).await;
        assert_eq!(end, SessionEnd::Cancelled);
    }
}
