//! Reply sanitization.
//!
//! The backend emits markdown emphasis, but the channel renders `*`
//! literally (or interprets it as its own formatting), so `**bold**` and
//! `*italic*` pairs are unwrapped before delivery.

/// Strip `**bold**` and `*italic*` emphasis markers, keeping the text
/// between them. Unpaired markers are left untouched.
#[must_use]
pub fn strip_emphasis(text: &str) -> String {
    strip_pairs(&strip_pairs(text, "**"), "*")
}

/// Remove delimiter pairs whose enclosed span is non-empty and free of
/// further asterisks, mirroring a `delim([^*]+)delim` match.
fn strip_pairs(text: &str, delim: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(delim) {
        let after = &rest[start + delim.len()..];
        match after.find(delim) {
            Some(end) if end > 0 && !after[..end].contains('*') => {
                out.push_str(&rest[..start]);
                out.push_str(&after[..end]);
                rest = &after[end + delim.len()..];
            },
            _ => {
                out.push_str(&rest[..start + delim.len()]);
                rest = after;
            },
        }
    }
    out.push_str(rest);
    out
}
