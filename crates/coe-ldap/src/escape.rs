//! Escaping of caller-supplied text for filters and distinguished names.
//!
//! Every piece of untrusted text must pass through [`escape`] before it is interpolated into a
//! search filter or DN. Each metacharacter is replaced by a backslash followed by its two-digit
//! lower-case hexadecimal code (RFC 4515 / RFC 4514 hex-pair form).

/// Where an escaped value is going to be interpolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeContext {
    /// Search filter assertion value.
    Filter,
    /// Distinguished name attribute value.
    Dn,
}

impl EscapeContext {
    const fn is_meta(self, ch: char) -> bool {
        match self {
            Self::Filter => matches!(ch, '*' | '(' | ')' | '\\' | '\0'),
            Self::Dn => matches!(ch, ',' | '=' | '+' | '<' | '>' | ';' | '\\' | '"' | '#'),
        }
    }
}

/// Escapes `value` for the given context.
///
/// Single pass: the backslashes introduced here are never escaped a second time.
#[must_use]
pub fn escape(value: &str, context: EscapeContext) -> String {
    value.chars().fold(String::with_capacity(value.len()), |mut acc, ch| {
        if context.is_meta(ch) {
            acc.push_str(&format!("\\{:02x}", ch as u32));
        } else {
            acc.push(ch);
        }
        acc
    })
}

/// Shorthand for [`escape`] in filter context.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    escape(value, EscapeContext::Filter)
}

/// Shorthand for [`escape`] in DN context.
#[must_use]
pub fn escape_dn_value(value: &str) -> String {
    escape(value, EscapeContext::Dn)
}
