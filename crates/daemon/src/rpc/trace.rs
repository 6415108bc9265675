// Trace ids attached to each request's tracing span.

use serde_json::Value;
use uuid::Uuid;

/// The caller-supplied `trace_id` (top level or inside `params`), or a
/// fresh UUID when the request carries none.
pub fn trace_id_from_raw_request(raw: &[u8]) -> String {
    serde_json::from_slice::<Value>(raw)
        .ok()
        .and_then(|value| trace_id_from_value(&value))
        .unwrap_or_else(generate_trace_id)
}

fn trace_id_from_value(value: &Value) -> Option<String> {
    extract_trace_id(value)
        .or_else(|| value.get("params").and_then(extract_trace_id))
        .filter(|trace_id| !trace_id.trim().is_empty())
        .map(ToOwned::to_owned)
}

fn extract_trace_id(value: &Value) -> Option<&str> {
    value.as_object()?.get("trace_id")?.as_str()
}

fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}
