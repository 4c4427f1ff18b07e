// ABOUTME: Buffer reconciliation engine turning snapshot or delta updates into true increments
// ABOUTME: Infers per-kind delivery mode once, tracks accumulated text, and emits block markers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # Buffer Reconciliation
//!
//! Upstream channels deliver either the full text so far on every update
//! (snapshot mode) or only the new text (delta mode), and nothing announces
//! which. The [`Reconciler`] treats the first observation of a kind as a
//! delta, decides the mode on the second observation with a prefix check,
//! and freezes that decision for the rest of the invocation.
//!
//! Content-kind changes are tagged: entering a markable kind (by default
//! `thinking`) emits [`Emission::Open`], leaving it emits [`Emission::Close`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, warn};

use crate::config::ContentMarkers;
use crate::notification::ContentBuffer;

/// How upstream delivers text for one content kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Only one observation so far
    #[default]
    Unknown,
    /// Every update repeats the full text
    Snapshot,
    /// Every update carries only new text
    Delta,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Snapshot => write!(f, "snapshot"),
            Self::Delta => write!(f, "delta"),
        }
    }
}

/// Reconciliation state of one content kind
#[derive(Debug, Clone, Default)]
pub struct KindState {
    /// Delivery mode, frozen once it leaves `Unknown`
    pub mode: DeliveryMode,
    /// Full logical text produced so far for this kind
    pub accumulated: String,
}

/// Which kind is active and whether a marked block is open
#[derive(Debug, Clone, Default)]
pub struct TransitionState {
    /// Kind of the most recent non-empty update
    pub current_kind: Option<String>,
    /// Whether an open marker is waiting for its close
    pub inside_marked_block: bool,
}

/// One unit of downstream output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    /// Incremental text, never the accumulated total
    Text(String),
    /// A markable block begins
    Open,
    /// A markable block ends
    Close,
}

impl Emission {
    /// Text written downstream for this emission
    #[must_use]
    pub fn render<'a>(&'a self, markers: &'a ContentMarkers) -> &'a str {
        match self {
            Self::Text(text) => text,
            Self::Open => &markers.open,
            Self::Close => &markers.close,
        }
    }
}

/// Per-invocation reconciliation engine
#[derive(Debug, Default)]
pub struct Reconciler {
    kinds: HashMap<String, KindState>,
    transition: TransitionState,
    markable: HashSet<String>,
}

impl Reconciler {
    /// Create a reconciler that wraps the given kinds in markers
    #[must_use]
    pub fn new<I, S>(markable_kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kinds: HashMap::new(),
            transition: TransitionState::default(),
            markable: markable_kinds.into_iter().map(Into::into).collect(),
        }
    }

    /// Apply one update and return what must be emitted, in order
    pub fn apply(&mut self, buffer: &ContentBuffer) -> Vec<Emission> {
        if buffer.content.is_empty() {
            return Vec::new();
        }

        let mut out = self.transition_to(&buffer.kind);

        let state = self.kinds.entry(buffer.kind.clone()).or_default();
        let delta = reconcile(state, &buffer.kind, &buffer.content);
        debug!(
            kind = %buffer.kind,
            mode = %state.mode,
            delta_len = delta.len(),
            accumulated_len = state.accumulated.len(),
            "Reconciled update"
        );

        if !delta.is_empty() {
            out.push(Emission::Text(delta));
        }
        out
    }

    /// Close a block left open at the end of the invocation
    ///
    /// Returns `Some(Emission::Close)` at most once.
    pub fn finish(&mut self) -> Option<Emission> {
        if self.transition.inside_marked_block {
            self.transition.inside_marked_block = false;
            Some(Emission::Close)
        } else {
            None
        }
    }

    /// Frozen delivery mode of a kind, if the kind has been seen
    #[must_use]
    pub fn mode(&self, kind: &str) -> Option<DeliveryMode> {
        self.kinds.get(kind).map(|s| s.mode)
    }

    /// Full text produced so far for a kind
    #[must_use]
    pub fn accumulated(&self, kind: &str) -> Option<&str> {
        self.kinds.get(kind).map(|s| s.accumulated.as_str())
    }

    /// Kind of the most recent non-empty update
    #[must_use]
    pub fn current_kind(&self) -> Option<&str> {
        self.transition.current_kind.as_deref()
    }

    /// Whether a marked block is currently open
    #[must_use]
    pub const fn inside_marked_block(&self) -> bool {
        self.transition.inside_marked_block
    }

    fn transition_to(&mut self, kind: &str) -> Vec<Emission> {
        let mut out = Vec::new();
        if self.transition.current_kind.as_deref() == Some(kind) {
            return out;
        }

        if self.transition.inside_marked_block {
            out.push(Emission::Close);
            self.transition.inside_marked_block = false;
        }
        if self.markable.contains(kind) {
            out.push(Emission::Open);
            self.transition.inside_marked_block = true;
        }
        debug!(
            from = ?self.transition.current_kind,
            to = %kind,
            "Content kind transition"
        );
        self.transition.current_kind = Some(kind.to_owned());
        out
    }
}

/// Compute the true increment for one observation and update the kind state
fn reconcile(state: &mut KindState, kind: &str, content: &str) -> String {
    if state.mode == DeliveryMode::Unknown && !state.accumulated.is_empty() {
        state.mode = if content.starts_with(state.accumulated.as_str()) {
            DeliveryMode::Snapshot
        } else {
            DeliveryMode::Delta
        };
        debug!(kind = %kind, mode = %state.mode, "Delivery mode inferred");
    }

    match state.mode {
        DeliveryMode::Snapshot => {
            let prev_len = state.accumulated.len();
            let delta = if content.starts_with(state.accumulated.as_str()) {
                &content[prev_len..]
            } else {
                warn!(
                    kind = %kind,
                    prev_len,
                    new_len = content.len(),
                    "Snapshot no longer extends accumulated text"
                );
                content.get(prev_len..).unwrap_or_default()
            };
            let delta = delta.to_owned();
            content.clone_into(&mut state.accumulated);
            delta
        }
        DeliveryMode::Delta => {
            state.accumulated.push_str(content);
            content.to_owned()
        }
        DeliveryMode::Unknown => {
            content.clone_into(&mut state.accumulated);
            content.to_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thinking_reconciler() -> Reconciler {
        Reconciler::new(["thinking"])
    }

    fn feed(reconciler: &mut Reconciler, kind: &str, contents: &[&str]) -> Vec<Emission> {
        contents
            .iter()
            .flat_map(|c| reconciler.apply(&ContentBuffer::new(kind, *c)))
            .collect()
    }

    fn texts(emissions: &[Emission]) -> Vec<&str> {
        emissions
            .iter()
            .filter_map(|e| match e {
                Emission::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn snapshot_sequence_emits_suffixes() {
        let mut r = thinking_reconciler();
        let out = feed(&mut r, "chat", &["Hi", "Hi there", "Hi there, friend"]);
        assert_eq!(texts(&out), vec!["Hi", " there", ", friend"]);
        assert_eq!(r.mode("chat"), Some(DeliveryMode::Snapshot));
        assert_eq!(r.accumulated("chat"), Some("Hi there, friend"));
    }

    #[test]
    fn snapshot_deltas_concatenate_to_final_text() {
        let snapshots = ["a", "ab", "abc", "abcdef", "abcdefg"];
        let mut r = thinking_reconciler();
        let out = feed(&mut r, "chat", &snapshots);
        assert_eq!(texts(&out).concat(), "abcdefg");
    }

    #[test]
    fn delta_sequence_passes_through_verbatim() {
        let mut r = thinking_reconciler();
        let out = feed(&mut r, "chat", &["Hello", ", wor", "ld"]);
        assert_eq!(texts(&out), vec!["Hello", ", wor", "ld"]);
        assert_eq!(r.mode("chat"), Some(DeliveryMode::Delta));
        assert_eq!(r.accumulated("chat"), Some("Hello, world"));
    }

    #[test]
    fn first_observation_leaves_mode_unknown() {
        let mut r = thinking_reconciler();
        let out = feed(&mut r, "chat", &["Hi"]);
        assert_eq!(texts(&out), vec!["Hi"]);
        assert_eq!(r.mode("chat"), Some(DeliveryMode::Unknown));
    }

    #[test]
    fn frozen_delta_mode_is_not_reinferred() {
        let mut r = thinking_reconciler();
        // "ab" then "c" settles delta mode; accumulated becomes "abc".
        // "abcd" would look like a snapshot on its own but must stay a delta.
        let out = feed(&mut r, "chat", &["ab", "c", "abcd"]);
        assert_eq!(texts(&out), vec!["ab", "c", "abcd"]);
        assert_eq!(r.mode("chat"), Some(DeliveryMode::Delta));
        assert_eq!(r.accumulated("chat"), Some("abcabcd"));
    }

    #[test]
    fn frozen_snapshot_mode_is_not_reinferred() {
        let mut r = thinking_reconciler();
        // "ab" then "abc" settles snapshot mode. A later "abcXYZ" still strips.
        let out = feed(&mut r, "chat", &["ab", "abc", "abcXYZ"]);
        assert_eq!(texts(&out), vec!["ab", "c", "XYZ"]);
        assert_eq!(r.mode("chat"), Some(DeliveryMode::Snapshot));
    }

    #[test]
    fn diverging_snapshot_emits_tail_past_old_length() {
        let mut r = thinking_reconciler();
        let out = feed(&mut r, "chat", &["ab", "abc", "xyzW"]);
        assert_eq!(texts(&out), vec!["ab", "c", "W"]);
        assert_eq!(r.accumulated("chat"), Some("xyzW"));
    }

    #[test]
    fn diverging_snapshot_respects_char_boundaries() {
        let mut r = thinking_reconciler();
        // accumulated "ab" (2 bytes); "é" starts at byte 0 and spans 2 bytes,
        // so byte offset 2 in "éz" is a boundary but offset 1 would not be.
        let out = feed(&mut r, "chat", &["a", "ab", "\u{e9}z"]);
        assert_eq!(texts(&out), vec!["a", "b", "z"]);

        let mut r = thinking_reconciler();
        let out = feed(&mut r, "chat", &["a", "ab", "abc", "\u{e9}\u{e9}"]);
        // old length 3 falls inside the second "é": nothing is emitted
        assert_eq!(texts(&out), vec!["a", "b", "c"]);
    }

    #[test]
    fn identical_resend_counts_as_empty_snapshot() {
        let mut r = thinking_reconciler();
        let out = feed(&mut r, "chat", &["same", "same", "same more"]);
        assert_eq!(texts(&out), vec!["same", " more"]);
        assert_eq!(r.mode("chat"), Some(DeliveryMode::Snapshot));
    }

    #[test]
    fn empty_content_is_ignored() {
        let mut r = thinking_reconciler();
        let out = feed(&mut r, "thinking", &[""]);
        assert!(out.is_empty());
        assert!(r.current_kind().is_none());
        assert!(r.mode("thinking").is_none());
    }

    #[test]
    fn thinking_then_chat_marks_block() {
        let mut r = thinking_reconciler();
        let mut out = feed(&mut r, "thinking", &["Let", "Let me think"]);
        out.extend(feed(&mut r, "chat", &["Answer"]));
        assert_eq!(
            out,
            vec![
                Emission::Open,
                Emission::Text("Let".to_owned()),
                Emission::Text(" me think".to_owned()),
                Emission::Close,
                Emission::Text("Answer".to_owned()),
            ]
        );
        assert_eq!(r.finish(), None);
    }

    #[test]
    fn finish_closes_open_block_once() {
        let mut r = thinking_reconciler();
        feed(&mut r, "thinking", &["pondering"]);
        assert!(r.inside_marked_block());
        assert_eq!(r.finish(), Some(Emission::Close));
        assert_eq!(r.finish(), None);
    }

    #[test]
    fn returning_to_a_kind_reopens_block_and_keeps_mode() {
        let mut r = thinking_reconciler();
        let mut out = feed(&mut r, "thinking", &["a", "ab"]);
        out.extend(feed(&mut r, "chat", &["x"]));
        out.extend(feed(&mut r, "thinking", &["abc"]));
        assert_eq!(
            out,
            vec![
                Emission::Open,
                Emission::Text("a".to_owned()),
                Emission::Text("b".to_owned()),
                Emission::Close,
                Emission::Text("x".to_owned()),
                Emission::Open,
                Emission::Text("c".to_owned()),
            ]
        );
    }

    #[test]
    fn unmarked_kind_switch_emits_no_markers() {
        let mut r = thinking_reconciler();
        let mut out = feed(&mut r, "chat", &["one"]);
        out.extend(feed(&mut r, "summary", &["two"]));
        assert_eq!(
            out,
            vec![
                Emission::Text("one".to_owned()),
                Emission::Text("two".to_owned())
            ]
        );
    }

    #[test]
    fn consecutive_markable_kinds_close_before_open() {
        let mut r = Reconciler::new(["thinking", "plan"]);
        let mut out = feed(&mut r, "thinking", &["t"]);
        out.extend(feed(&mut r, "plan", &["p"]));
        assert_eq!(
            out,
            vec![
                Emission::Open,
                Emission::Text("t".to_owned()),
                Emission::Close,
                Emission::Open,
                Emission::Text("p".to_owned()),
            ]
        );
    }

    #[test]
    fn kinds_infer_modes_independently() {
        let mut r = thinking_reconciler();
        feed(&mut r, "thinking", &["a", "ab"]);
        feed(&mut r, "chat", &["x", "y"]);
        assert_eq!(r.mode("thinking"), Some(DeliveryMode::Snapshot));
        assert_eq!(r.mode("chat"), Some(DeliveryMode::Delta));
    }

    #[test]
    fn render_uses_markers() {
        let markers = ContentMarkers {
            open: "[[".to_owned(),
            close: "]]".to_owned(),
        };
        assert_eq!(Emission::Open.render(&markers), "[[");
        assert_eq!(Emission::Close.render(&markers), "]]");
        assert_eq!(Emission::Text("t".to_owned()).render(&markers), "t");
    }
}
