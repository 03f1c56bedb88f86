//! Bounded, char-safe truncation for text that leaves the process.
//!
//! Upstream payloads end up in client-facing error details, log lines and
//! the extraction fallback. All of those need a hard length bound that never
//! splits a multi-byte character.

/// Maximum characters of upstream detail exposed to API clients.
pub const MAX_DETAIL_CHARS: usize = 300;

/// Maximum characters of the serialized-response fallback reply.
pub const MAX_FALLBACK_CHARS: usize = 1000;

/// Maximum characters of a reply echoed into log lines.
pub const MAX_LOG_CHARS: usize = 120;

/// Return the first `max_chars` characters of `s`.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Collapse whitespace runs (including newlines) to single spaces and bound
/// the result to `max_chars` characters.
///
/// Used for upstream error bodies, which are frequently pretty-printed JSON
/// or HTML and would otherwise leak layout noise into a one-line detail.
pub fn compact_detail(s: &str, max_chars: usize) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max_chars).to_string()
}
