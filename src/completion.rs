// ABOUTME: Completion detector gating stream end on upstream state notifications
// ABOUTME: Ignores "not in progress" until at least one update envelope has arrived
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use tracing::debug;

/// What to do with a `state` notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateVerdict {
    /// Generation is over: close any open block and end the stream
    Finish,
    /// Keep listening
    Continue,
}

/// Distinguishes real completion from the transient idle state upstream
/// reports before work begins
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionDetector {
    received_any_update: bool,
}

impl CompletionDetector {
    /// Create a detector that has seen nothing yet
    #[must_use]
    pub const fn new() -> Self {
        Self {
            received_any_update: false,
        }
    }

    /// Record an `update` envelope, whether or not its buffer parsed
    pub fn record_update(&mut self) {
        self.received_any_update = true;
    }

    /// Whether any update envelope has arrived
    #[must_use]
    pub const fn received_any_update(&self) -> bool {
        self.received_any_update
    }

    /// Judge a `state` notification
    pub fn on_state(&self, in_progress: bool) -> StateVerdict {
        if in_progress {
            return StateVerdict::Continue;
        }
        if self.received_any_update {
            debug!("Upstream reports generation finished");
            StateVerdict::Finish
        } else {
            debug!("Upstream not in progress before any update; waiting");
            StateVerdict::Continue
        }
    }
}
