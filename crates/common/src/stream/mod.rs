// Recognising tool calls inside streamed model output.

pub mod extractor;
pub mod scanner;
pub mod sse;

pub use extractor::{
    extract_tool_calls, Extraction, ExtractorConfig, ToolCallExtractor, ToolCommand,
    TruncationPolicy,
};
pub use scanner::{scan_object, ScanOutcome};
