//! Logging utilities for sanitizing chat-sourced names and webhook bodies so
//! logs stay single-line. Escapes control characters that otherwise break
//! log readability.

/// Escape a chat-sourced string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
///   Truncates very long strings with an ellipsis to cap log noise.
pub fn escape_log(s: &str) -> String {
    escape_with_limit(s, 120)
}

/// Render a raw webhook body for a debug line. Invalid UTF-8 is replaced
/// rather than rejected; delivery bodies come from the network and are
/// logged before they are trusted.
pub fn payload_preview(body: &[u8]) -> String {
    escape_with_limit(&String::from_utf8_lossy(body), 200)
}

fn escape_with_limit(s: &str, max_preview: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_preview) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= max_preview {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                // Represent other control chars as hex \xNN
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
