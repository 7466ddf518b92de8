//! POSIX single-quote escaping, the one explicit shell-quoting utility
//! named in §4.2. Neither exec shape performs quoting automatically;
//! callers that need it reach for this helper explicitly.

/// Wraps `s` in single quotes, escaping any embedded `'` as `'\''`.
pub fn shell_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}
