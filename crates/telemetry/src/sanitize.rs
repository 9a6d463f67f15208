//! Payload capping for log records.

use std::borrow::Cow;

/// Appended to any payload that was cut to fit the cap.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Cap `text` at `max_chars` characters.
///
/// Oversized text is cut so that the kept prefix plus [`TRUNCATION_MARKER`]
/// is exactly `max_chars` characters long. Counting is by `char`, so a cut
/// never splits a UTF-8 sequence.
pub fn truncate(text: &str, max_chars: usize) -> Cow<'_, str> {
    // Fast path: byte length bounds char count from above.
    if text.len() <= max_chars || text.chars().count() <= max_chars {
        return Cow::Borrowed(text);
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return Cow::Owned(TRUNCATION_MARKER.chars().take(max_chars).collect());
    }

    let keep = max_chars - marker_len;
    let cut = text
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());

    let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
    out.push_str(&text[..cut]);
    out.push_str(TRUNCATION_MARKER);
    Cow::Owned(out)
}

/// Render a JSON value the way it appears in the log (pretty-printed), capped.
pub fn json_payload(value: &serde_json::Value, max_chars: usize) -> String {
    let rendered = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("<unserializable payload: {e}>"));
    truncate(&rendered, max_chars).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_borrowed() {
        assert!(matches!(truncate("hello", 100), Cow::Borrowed("hello")));
    }

    #[test]
    fn exact_cap_is_untouched() {
        let text = "a".repeat(64);
        assert_eq!(truncate(&text, 64), text);
    }

    #[test]
    fn oversized_text_fits_cap_with_marker() {
        let text = "x".repeat(50_000);
        let out = truncate(&text, 10_000);
        assert_eq!(out.chars().count(), 10_000);
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn multibyte_text_cut_on_char_boundary() {
        let text = "₿".repeat(100);
        let out = truncate(&text, 40);
        assert_eq!(out.chars().count(), 40);
        assert!(out.starts_with('₿'));
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn tiny_cap_yields_marker_prefix() {
        let out = truncate("abcdefghijklmnopqrstuvwxyz", 5);
        assert_eq!(out, "...[t");
    }

    #[test]
    fn json_payload_is_pretty_and_capped() {
        let value = serde_json::json!({"symbol": "BTC"});
        assert!(json_payload(&value, 1000).contains("\"symbol\": \"BTC\""));

        let big = serde_json::json!({"blob": "z".repeat(5000)});
        assert_eq!(json_payload(&big, 200).chars().count(), 200);
    }
}
