// Tool-call extraction from streamed model output.
//
// Model text arrives in arbitrary chunks. Any balanced JSON object whose
// `tool` field equals the configured tag is a command; everything else is
// prose and is skipped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::scanner::{scan_object, ScanOutcome};
use crate::protocol::wire::Request;

/// Tag the model uses to address the layout application.
pub const DEFAULT_TOOL_TAG: &str = "klayout";
/// Remainder size that triggers the buffer guard.
pub const DEFAULT_MAX_BUFFER: usize = 8192;
/// Bytes kept by the `tail` policy when the guard triggers.
pub const DEFAULT_KEEP_TAIL: usize = 4096;
/// Request id used when a tool call does not carry one.
pub const DEFAULT_COMMAND_ID: i64 = 1;

/// A tool call recognised in the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCommand {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub params: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl ToolCommand {
    /// Build a command from a scanned value when its `tool` matches `tag`.
    pub fn from_value(value: Value, tag: &str) -> Option<Self> {
        let Value::Object(mut object) = value else {
            return None;
        };
        match object.get("tool") {
            Some(Value::String(tool)) if tool == tag => {}
            _ => return None,
        }

        let method = match object.remove("method") {
            Some(Value::String(method)) if !method.is_empty() => Some(method),
            _ => None,
        };
        let params = match object.remove("params") {
            Some(Value::Object(params)) => params,
            _ => Map::new(),
        };
        let id = object.get("id").and_then(Value::as_i64);

        Some(Self { tool: tag.to_string(), method, params, id })
    }

    /// The control request this command forwards to, if it names a method.
    pub fn to_request(&self) -> Option<Request> {
        let method = self.method.as_deref()?;
        Some(Request::new(self.id.unwrap_or(DEFAULT_COMMAND_ID), method, self.params.clone()))
    }
}

/// Commands found in one pass plus the text still awaiting completion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extraction {
    pub commands: Vec<ToolCommand>,
    /// Empty, or the text from the first unterminated `{` onward.
    pub remainder: String,
}

/// Extract every complete tool call from `buffer`.
pub fn extract_tool_calls(buffer: &str, tag: &str) -> Extraction {
    let mut commands = Vec::new();
    let mut index = 0;

    while let Some(offset) = buffer[index..].find('{') {
        let start = index + offset;
        match scan_object(buffer, start) {
            ScanOutcome::Parsed { value, end } => {
                if let Some(command) = ToolCommand::from_value(value, tag) {
                    commands.push(command);
                }
                index = end;
            }
            ScanOutcome::Malformed { end } => index = end,
            ScanOutcome::Incomplete => {
                return Extraction { commands, remainder: buffer[start..].to_string() };
            }
            ScanOutcome::NotAnObject => index = start + 1,
        }
    }

    Extraction { commands, remainder: String::new() }
}

/// What the buffer guard does once the pending text grows past `max_buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationPolicy {
    /// Keep only the last `keep_tail` bytes. Can orphan the continuation of
    /// an object whose opening brace was cut off.
    Tail,
    /// Give up on the oldest unterminated `{` and rescan after it, so the
    /// buffer never holds a fragment without its opener.
    #[default]
    DropOpener,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub tool_tag: String,
    pub max_buffer: usize,
    pub keep_tail: usize,
    pub truncation: TruncationPolicy,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            tool_tag: DEFAULT_TOOL_TAG.to_string(),
            max_buffer: DEFAULT_MAX_BUFFER,
            keep_tail: DEFAULT_KEEP_TAIL,
            truncation: TruncationPolicy::default(),
        }
    }
}

/// Incremental extractor for one logical stream.
///
/// Call [`push`](Self::push) with each content delta; create a fresh
/// instance per stream.
#[derive(Debug)]
pub struct ToolCallExtractor {
    config: ExtractorConfig,
    buffer: String,
    truncations: usize,
}

impl Default for ToolCallExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl ToolCallExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config, buffer: String::new(), truncations: 0 }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Append a delta and return the commands it completed.
    pub fn push(&mut self, delta: &str) -> Vec<ToolCommand> {
        self.buffer.push_str(delta);
        let Extraction { mut commands, remainder } =
            extract_tool_calls(&self.buffer, &self.config.tool_tag);
        self.buffer = remainder;

        if self.buffer.len() > self.config.max_buffer {
            self.truncations += 1;
            match self.config.truncation {
                TruncationPolicy::Tail => {
                    let keep = self.config.keep_tail.min(self.config.max_buffer);
                    let cut = tail_boundary(&self.buffer, keep);
                    self.buffer.drain(..cut);
                }
                TruncationPolicy::DropOpener => commands.extend(self.drop_stale_openers()),
            }
        }

        commands
    }

    /// Text held back waiting for an object to close.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// How many times the buffer guard has fired.
    pub fn truncations(&self) -> usize {
        self.truncations
    }

    /// End the stream, returning whatever unterminated text was left.
    pub fn finish(self) -> String {
        self.buffer
    }

    fn drop_stale_openers(&mut self) -> Vec<ToolCommand> {
        let mut recovered = Vec::new();
        while self.buffer.len() > self.config.max_buffer {
            // The remainder always starts at its unterminated `{`.
            let Extraction { commands, remainder } =
                extract_tool_calls(&self.buffer[1..], &self.config.tool_tag);
            recovered.extend(commands);
            self.buffer = remainder;
        }
        recovered
    }
}

fn tail_boundary(text: &str, keep: usize) -> usize {
    let mut cut = text.len().saturating_sub(keep);
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    cut
}
