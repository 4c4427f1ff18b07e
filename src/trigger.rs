// ABOUTME: Out-of-band HTTP call that starts upstream generation for a socket session
// ABOUTME: Failures are logged and swallowed; the bridge only depends on the socket stream
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::BridgeConfig;
use crate::types::{BridgeError, SessionContext};

/// Number of response body characters kept in failure logs
const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// Starts generation into the session a socket is subscribed to
///
/// Implementations must not fail loudly: a trigger that does not reach
/// upstream simply leaves the socket silent until it closes or times out.
#[async_trait]
pub trait GenerationTrigger: Send + Sync {
    /// Ask upstream to start producing content for `session`
    async fn fire(&self, session: &SessionContext);
}

/// JSON body of the trigger call
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerPayload<'a> {
    prompt: &'a str,
    session_id: &'a str,
    model: &'a str,
}

/// Trigger that POSTs `{prompt, sessionId, model}` to the configured endpoint
pub struct HttpTrigger {
    client: reqwest::Client,
    url: String,
    origin: Option<String>,
}

impl HttpTrigger {
    /// Create a trigger from the bridge configuration
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the HTTP client cannot be built.
    pub fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(config.trigger_timeout)
            .build()
            .map_err(|e| BridgeError::config(format!("Failed to build trigger client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a trigger sharing an existing HTTP client
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: &BridgeConfig) -> Self {
        Self {
            client,
            url: config.trigger_url.clone(),
            origin: config.origin.clone(),
        }
    }
}

#[async_trait]
impl GenerationTrigger for HttpTrigger {
    async fn fire(&self, session: &SessionContext) {
        let payload = TriggerPayload {
            prompt: &session.prompt,
            session_id: &session.session_id,
            model: &session.model,
        };

        let mut request = self
            .client
            .post(&self.url)
            .bearer_auth(&session.auth_token)
            .json(&payload);
        if let Some(origin) = &self.origin {
            request = request.header(reqwest::header::ORIGIN, origin);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(
                    session_id = %session.session_id,
                    status = resp.status().as_u16(),
                    "Generation trigger accepted"
                );
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!(
                    session_id = %session.session_id,
                    status = status.as_u16(),
                    body = %preview(&body),
                    "Generation trigger rejected"
                );
            }
            Err(e) => {
                error!(
                    session_id = %session.session_id,
                    error = %e,
                    "Generation trigger request failed"
                );
            }
        }
    }
}

/// Fire a trigger without waiting for it
///
/// The returned handle may be dropped; the request keeps running.
pub fn spawn_trigger(
    trigger: Arc<dyn GenerationTrigger>,
    session: Arc<SessionContext>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        trigger.fire(&session).await;
    })
}

fn preview(body: &str) -> String {
    body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect()
}
