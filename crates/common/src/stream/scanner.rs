// Brace matching over a text buffer that may still be growing.
//
// Only the ASCII bytes `{`, `}`, `"` and `\` drive the state machine, so
// scanning raw UTF-8 bytes never splits a multi-byte character.

use serde_json::Value;

/// Result of scanning from one `{`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// The balanced span parsed as JSON. `end` is one past its closing brace.
    Parsed { value: Value, end: usize },
    /// The span was balanced but is not valid JSON. Callers must skip to `end`.
    Malformed { end: usize },
    /// The text ended before the braces balanced. Retry from the same start
    /// once more text has arrived.
    Incomplete,
    /// `start` does not point at `{`.
    NotAnObject,
}

/// Scan the balanced `{...}` run beginning at byte offset `start`.
pub fn scan_object(text: &str, start: usize) -> ScanOutcome {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return ScanOutcome::NotAnObject;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if byte == b'\\' {
                escape = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start + offset + 1;
                    return match serde_json::from_str::<Value>(&text[start..end]) {
                        Ok(value) => ScanOutcome::Parsed { value, end },
                        Err(_) => ScanOutcome::Malformed { end },
                    };
                }
            }
            _ => {}
        }
    }

    ScanOutcome::Incomplete
}
