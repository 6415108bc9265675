// Content deltas from OpenAI-style server-sent event lines.

use serde_json::Value;

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// Text carried by one `data:` line of a chat-completions stream.
///
/// Prefers `choices[0].delta.content` and falls back to
/// `choices[0].message.content` for non-streaming replies. Returns `None`
/// for comments, keep-alives, `[DONE]`, unparsable payloads and empty text.
pub fn delta_content(line: &str) -> Option<String> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload == DONE_MARKER {
        return None;
    }

    let data: Value = serde_json::from_str(payload).ok()?;
    let choice = data.get("choices")?.as_array()?.first()?;

    let content = match choice.get("delta").and_then(|delta| delta.get("content")) {
        Some(Value::String(content)) => content.as_str(),
        _ => choice.get("message")?.get("content")?.as_str()?,
    };

    (!content.is_empty()).then(|| content.to_string())
}
