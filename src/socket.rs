// ABOUTME: Socket event adapter turning upstream WebSocket frames into a pull-based event stream
// ABOUTME: One pump task feeds an unbounded queue; the stream ends after exactly one close or error
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # Socket Event Adapter
//!
//! [`connect`] opens the upstream session socket and splits it into a
//! writer (kept for the closing handshake) and a [`SocketEvents`] reader.
//!
//! The reader is fed by a single pump task. Events are queued without a
//! bound so the network side never waits on a slow consumer; an
//! unconsumed stream therefore grows until the session ends. That is
//! acceptable for chat sessions lasting minutes, not for long-lived
//! subscriptions.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, ORIGIN};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::types::{BridgeError, SessionContext};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on sending our close frame to a stalled peer
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// One event observed on the upstream socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text payload (binary frames are accepted when valid UTF-8)
    Message(String),
    /// The socket closed
    Close,
    /// The socket failed
    Error(String),
}

impl SocketEvent {
    /// Whether this event ends the sequence
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Close | Self::Error(_))
    }
}

/// Ordered, pull-based sequence of socket events
///
/// Yields events in transport order and ends right after the first
/// [`SocketEvent::Close`] or [`SocketEvent::Error`]. Dropping it aborts
/// the pump task.
pub struct SocketEvents {
    rx: mpsc::UnboundedReceiver<SocketEvent>,
    pump: Option<JoinHandle<()>>,
    terminated: bool,
}

impl SocketEvents {
    /// Start pumping an upstream frame stream into a new event sequence
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_frames<S>(frames: S) -> Self
    where
        S: Stream<Item = Result<Message, WsError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_frames(frames, tx));
        Self {
            rx,
            pump: Some(pump),
            terminated: false,
        }
    }
}

impl Stream for SocketEvents {
    type Item = SocketEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.terminated {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.terminated = true;
                }
                Poll::Ready(Some(event))
            }
            // Pump vanished without a terminal event (aborted or panicked)
            Poll::Ready(None) => {
                self.terminated = true;
                Poll::Ready(Some(SocketEvent::Close))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SocketEvents {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// The single consumer of the upstream frame stream
async fn pump_frames<S>(frames: S, tx: mpsc::UnboundedSender<SocketEvent>)
where
    S: Stream<Item = Result<Message, WsError>> + Send,
{
    let mut frames = Box::pin(frames);
    while let Some(frame) = frames.next().await {
        let event = match frame {
            Ok(Message::Text(text)) => SocketEvent::Message(text.as_str().to_owned()),
            Ok(Message::Binary(bin)) => match String::from_utf8(bin.to_vec()) {
                Ok(text) => SocketEvent::Message(text),
                Err(e) => {
                    debug!(error = %e, "Dropping non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                debug!(close_frame = ?frame, "Upstream socket sent close");
                let _ = tx.send(SocketEvent::Close);
                return;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
            Err(e) => {
                let _ = tx.send(SocketEvent::Error(e.to_string()));
                return;
            }
        };
        if tx.send(event).is_err() {
            // Consumer dropped the sequence
            return;
        }
    }
    let _ = tx.send(SocketEvent::Close);
}

/// A live upstream session socket
pub struct SocketConnection {
    writer: SplitSink<WsStream, Message>,
    events: SocketEvents,
}

impl SocketConnection {
    /// Events arriving on the socket
    pub fn events(&mut self) -> &mut SocketEvents {
        &mut self.events
    }

    /// Send a close frame and release the socket
    ///
    /// Best effort: a peer that already went away is not an error.
    pub async fn close(mut self) {
        let handshake = async {
            if let Err(e) = self.writer.send(Message::Close(None)).await {
                debug!(error = %e, "Close frame not delivered");
            }
            let _ = self.writer.close().await;
        };
        if tokio::time::timeout(CLOSE_TIMEOUT, handshake).await.is_err() {
            debug!("Close handshake timed out; dropping socket");
        }
        drop(self.events);
    }
}

/// Build the session socket URL from the configured base
pub(crate) fn session_url(
    base: &str,
    session: &SessionContext,
) -> Result<reqwest::Url, BridgeError> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| BridgeError::config(format!("Invalid socket URL {base}: {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(BridgeError::config(format!(
            "Socket URL must use ws:// or wss://, got {}",
            url.scheme()
        )));
    }
    url.query_pairs_mut()
        .append_pair("sessionId", &session.session_id)
        .append_pair("userId", &session.upstream_user_id)
        .append_pair("token", &session.auth_token);
    Ok(url)
}

/// Open the upstream socket for a session
///
/// # Errors
///
/// Returns a `Config` error for an unusable URL or header value and a
/// `Transport` error when the handshake fails or times out.
pub async fn connect(
    config: &BridgeConfig,
    session: &SessionContext,
) -> Result<SocketConnection, BridgeError> {
    let url = session_url(&config.socket_url, session)?;
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| BridgeError::config(format!("Invalid socket request: {e}")))?;

    let bearer = HeaderValue::from_str(&format!("Bearer {}", session.auth_token))
        .map_err(|e| BridgeError::config(format!("Invalid auth token header: {e}")))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);
    if let Some(origin) = &config.origin {
        let origin = HeaderValue::from_str(origin)
            .map_err(|e| BridgeError::config(format!("Invalid origin header: {e}")))?;
        request.headers_mut().insert(ORIGIN, origin);
    }

    let (ws, _response) = tokio::time::timeout(
        config.connect_timeout,
        tokio_tungstenite::connect_async(request),
    )
    .await
    .map_err(|_| {
        BridgeError::transport(format!(
            "Socket handshake timed out after {}s",
            config.connect_timeout.as_secs()
        ))
    })?
    .map_err(|e| BridgeError::transport(format!("Socket connect failed: {e}")))?;

    info!(
        session_id = %session.session_id,
        host = url.host_str().unwrap_or_default(),
        "Upstream socket connected"
    );

    let (writer, reader) = ws.split();
    Ok(SocketConnection {
        writer,
        events: SocketEvents::from_frames(reader),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Result<Message, WsError> {
        Ok(Message::Text(s.to_owned().into()))
    }

    async fn collect(events: SocketEvents) -> Vec<SocketEvent> {
        events.collect::<Vec<_>>().await
    }

    #[tokio::test]
    async fn yields_messages_in_order_then_close() {
        let frames = futures_util::stream::iter(vec![
            text("one"),
            Ok(Message::Ping(Vec::new().into())),
            text("two"),
            Ok(Message::Close(None)),
            text("after close"),
        ]);
        let events = collect(SocketEvents::from_frames(frames)).await;
        assert_eq!(
            events,
            vec![
                SocketEvent::Message("one".to_owned()),
                SocketEvent::Message("two".to_owned()),
                SocketEvent::Close,
            ]
        );
    }

    #[tokio::test]
    async fn end_of_frames_is_a_close() {
        let frames = futures_util::stream::iter(vec![text("only")]);
        let events = collect(SocketEvents::from_frames(frames)).await;
        assert_eq!(
            events,
            vec![SocketEvent::Message("only".to_owned()), SocketEvent::Close]
        );
    }

    #[tokio::test]
    async fn error_terminates_sequence() {
        let frames = futures_util::stream::iter(vec![
            text("before"),
            Err(WsError::ConnectionClosed),
            text("never"),
        ]);
        let events = collect(SocketEvents::from_frames(frames)).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], SocketEvent::Message("before".to_owned()));
        assert!(matches!(events[1], SocketEvent::Error(_)));
    }

    #[tokio::test]
    async fn binary_utf8_is_a_message_and_invalid_is_dropped() {
        let frames = futures_util::stream::iter(vec![
            Ok(Message::Binary(b"{\"a\":1}".to_vec().into())),
            Ok(Message::Binary(vec![0xff, 0xfe].into())),
        ]);
        let events = collect(SocketEvents::from_frames(frames)).await;
        assert_eq!(
            events,
            vec![
                SocketEvent::Message("{\"a\":1}".to_owned()),
                SocketEvent::Close
            ]
        );
    }

    #[tokio::test]
    async fn nothing_after_terminal_event() {
        let frames = futures_util::stream::iter(vec![Ok(Message::Close(None))]);
        let mut events = SocketEvents::from_frames(frames);
        assert_eq!(events.next().await, Some(SocketEvent::Close));
        assert_eq!(events.next().await, None);
        assert_eq!(events.next().await, None);
    }

    #[test]
    fn session_url_appends_query() {
        let session = SessionContext::new("sess 1", "user-1", "tok", "GPT5", "hi");
        let url = session_url("wss://upstream.example/socket", &session).expect("url");
        assert_eq!(
            url.as_str(),
            "wss://upstream.example/socket?sessionId=sess+1&userId=user-1&token=tok"
        );
    }

    #[test]
    fn session_url_rejects_http_scheme() {
        let session = SessionContext::new("s", "u", "t", "m", "p");
        let err = session_url("https://upstream.example/socket", &session).expect_err("scheme");
        assert_eq!(err.kind, crate::types::ErrorKind::Config);
    }
}
