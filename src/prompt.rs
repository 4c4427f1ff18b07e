// ABOUTME: Collapses multi-turn ChatMessage sequences into the single-turn upstream prompt
// ABOUTME: Emits "role:\ncontent" blocks joined by blank lines, skipping empty messages
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use tracing::debug;

use crate::types::ChatMessage;

/// Flatten a conversation into the single prompt string the upstream accepts
///
/// Each message with non-blank content becomes `"<role>:\n<content>\n\n"`;
/// the blocks are then joined with `"\n\n"`. Messages whose content is
/// blank are dropped entirely.
#[must_use]
pub fn flatten_messages(messages: &[ChatMessage]) -> String {
    let parts: Vec<String> = messages
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| format!("{}:\n{}\n\n", m.role.as_str(), m.content))
        .collect();
    let prompt = parts.join("\n\n");
    debug!(
        message_count = messages.len(),
        kept = parts.len(),
        prompt_len = prompt.len(),
        "Flattened conversation into single-turn prompt"
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_user_message() {
        let prompt = flatten_messages(&[ChatMessage::user("Hello")]);
        assert_eq!(prompt, "user:\nHello\n\n");
    }

    #[test]
    fn multi_turn_joins_with_blank_lines() {
        let prompt = flatten_messages(&[
            ChatMessage::system("Be brief"),
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello!"),
            ChatMessage::user("Bye"),
        ]);
        assert_eq!(
            prompt,
            "system:\nBe brief\n\n\n\nuser:\nHi\n\n\n\nassistant:\nHello!\n\n\n\nuser:\nBye\n\n"
        );
    }

    #[test]
    fn blank_messages_are_skipped() {
        let prompt = flatten_messages(&[ChatMessage::assistant("  "), ChatMessage::user("Q")]);
        assert_eq!(prompt, "user:\nQ\n\n");
    }

    #[test]
    fn empty_conversation_flattens_to_nothing() {
        assert!(flatten_messages(&[]).is_empty());
    }
}
