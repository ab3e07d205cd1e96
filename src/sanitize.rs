//! Escaping of untrusted text before it reaches the mail provider.
//!
//! Every free-text field in a submitted email is attacker controlled. Header
//! bound values (addresses, subject, attachment metadata) go through
//! [`strict`], which makes every control character visible so no CR/LF can
//! smuggle an extra header or provider directive. The HTML body is rendered
//! content, so [`body_preserving`] keeps its line breaks and tabs.

use std::fmt::Write;

/// Escape every control character, including CR, LF and TAB.
///
/// ```
/// use hermes::sanitize;
///
/// assert_eq!(sanitize::strict("a\r\nb"), "a\\r\\nb");
/// assert_eq!(sanitize::strict("plain text"), "plain text");
/// ```
pub fn strict(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => push_hex_escape(&mut out, c),
            c => out.push(c),
        }
    }
    out
}

/// Escape control characters except line feed, carriage return and tab.
///
/// ```
/// use hermes::sanitize;
///
/// assert_eq!(sanitize::body_preserving("a\r\nb"), "a\r\nb");
/// assert_eq!(sanitize::body_preserving("a\u{7}b"), "a\\x07b");
/// ```
pub fn body_preserving(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\r' | '\n' | '\t' => out.push(ch),
            c if c.is_control() => push_hex_escape(&mut out, c),
            c => out.push(c),
        }
    }
    out
}

/// Drop everything outside the standard base64 alphabet (`A-Z a-z 0-9 + / =`).
///
/// Clients routinely wrap base64 at 76 columns or paste it with stray
/// whitespace; the decoder is strict, so those characters go first.
pub fn clean_base64(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .collect()
}

/// Apply [`strict`] to an optional value, mapping `None` to the empty string.
pub fn strict_opt(text: Option<&str>) -> String {
    text.map(strict).unwrap_or_default()
}

fn push_hex_escape(out: &mut String, c: char) {
    // Writing into a String cannot fail.
    let _ = write!(out, "\\x{:02X}", c as u32);
}
