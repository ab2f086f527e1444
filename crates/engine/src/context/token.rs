//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, counted over
//! Unicode scalar values. On Latin-script text this stays within roughly
//! ±15% of BPE tokenizers; it makes no claim of parity with any specific
//! model's tokenizer.

use tierwise_core::message::Message;

/// Per-message overhead for role name and delimiters in the wire format.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
pub fn estimate_message_tokens(message: &Message) -> usize {
    MESSAGE_OVERHEAD_TOKENS + estimate_tokens(&message.content)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Cut `text` so that it estimates at most `max_tokens`, appending `marker`
/// when anything was removed. The marker counts against the limit.
pub fn truncate_to_tokens(text: &str, max_tokens: usize, marker: &str) -> (String, bool) {
    if estimate_tokens(text) <= max_tokens {
        return (text.to_string(), false);
    }
    let max_chars = max_tokens * 4;
    let marker_chars = marker.chars().count();
    if max_chars <= marker_chars {
        return (String::new(), true);
    }

    let kept: String = text.chars().take(max_chars - marker_chars).collect();
    (format!("{kept}{marker}"), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 4 characters, 8 bytes
        assert_eq!(estimate_tokens("éèêë"), 1);
    }

    #[test]
    fn message_includes_overhead() {
        let msg = Message::user("test");
        assert_eq!(estimate_message_tokens(&msg), 5);
    }

    #[test]
    fn multiple_messages() {
        let msgs = vec![Message::user("hello"), Message::assistant("hi")];
        // (4 + 2) + (4 + 1)
        assert_eq!(estimate_messages_tokens(&msgs), 11);
    }

    #[test]
    fn estimate_is_subadditive() {
        let parts = ["abc", "defgh", "i", "jklmnop", ""];
        let joined: String = parts.concat();
        let sum: usize = parts.iter().map(|p| estimate_tokens(p)).sum();
        assert!(estimate_tokens(&joined) <= sum);
    }

    #[test]
    fn truncate_keeps_short_text() {
        let (out, cut) = truncate_to_tokens("short", 10, " […]");
        assert_eq!(out, "short");
        assert!(!cut);
    }

    #[test]
    fn truncate_respects_limit_including_marker() {
        let text = "a".repeat(100);
        let (out, cut) = truncate_to_tokens(&text, 5, " […]");
        assert!(cut);
        assert!(out.ends_with(" […]"));
        assert_eq!(estimate_tokens(&out), 5);
    }

    #[test]
    fn truncate_to_zero() {
        let (out, cut) = truncate_to_tokens("some text here", 0, " […]");
        assert!(out.is_empty());
        assert!(cut);
    }
}
