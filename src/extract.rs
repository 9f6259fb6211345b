//! Pulling code out of chat message text

use regex::Regex;
use std::sync::LazyLock;

static FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(\w*)\n?([\s\S]*?)```").expect("fenced block pattern"));

static INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("inline span pattern"));

/// Extract `(code, language_hint)` from a raw message.
///
/// The first fenced block wins, then the first inline span; a message with
/// neither is taken whole. Only fenced blocks carry a hint.
pub fn extract_code(text: &str) -> (String, Option<String>) {
    if let Some(caps) = FENCED.captures(text) {
        let hint = caps
            .get(1)
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let code = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
        return (code, hint);
    }

    if let Some(caps) = INLINE.captures(text) {
        return (caps[1].to_string(), None);
    }

    (text.trim().to_string(), None)
}
