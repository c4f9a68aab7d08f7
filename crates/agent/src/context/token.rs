//! Token estimation utilities.
//!
//! Uses a character-based heuristic: 2.5 characters per token. That is
//! deliberately pessimistic next to the usual 4-per-token rule for English,
//! so mixed-script text (CJK, emoji, code) does not blow past the window
//! before summarization kicks in.

use concierge_core::message::Message;

/// Estimate the token count for a string: `chars × 2 / 5`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() * 2 / 5
}

/// Estimate tokens for one message.
pub fn estimate_message_tokens(message: &Message) -> usize {
    estimate_tokens(&message.content)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    let chars: usize = messages.iter().map(Message::char_len).sum();
    chars * 2 / 5
}
