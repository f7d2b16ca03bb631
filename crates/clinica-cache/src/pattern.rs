//! Key pattern grammar shared by both leaf stores.
//!
//! Patterns use the Redis `KEYS`/`SCAN MATCH` glob grammar:
//!
//! | token      | matches                                   |
//! |------------|-------------------------------------------|
//! | `*`        | any run of bytes, `:` included            |
//! | `?`        | exactly one byte                          |
//! | `[abc]`    | one of the listed bytes                   |
//! | `[a-z]`    | one byte in the range                     |
//! | `[^a]`     | any byte except the listed ones           |
//! | `\x`       | the literal `x`                           |
//!
//! Matching works on the UTF-8 bytes of the key, as Redis does, so `?`
//! consumes one byte of a multi-byte character such as `ã`. The Redis store
//! sends the source glob to the server unchanged and the memory store matches
//! keys against the byte regex compiled here.

use std::fmt;

use regex::bytes::Regex;

use crate::error::{CacheError, Result};

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    source: String,
    regex: Regex,
}

impl KeyPattern {
    /// Compile a glob into a matcher.
    pub fn compile(glob: &str) -> Result<Self> {
        let translated = glob_to_regex(glob)
            .map_err(|reason| CacheError::invalid_pattern(glob, reason))?;
        let regex = Regex::new(&translated)
            .map_err(|e| CacheError::invalid_pattern(glob, e.to_string()))?;
        Ok(Self {
            source: glob.to_string(),
            regex,
        })
    }

    /// Whether `key` is selected by this pattern.
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key.as_bytes())
    }

    /// The glob as written by the caller.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Literal text before the first wildcard, with escapes resolved.
    pub fn literal_prefix(&self) -> String {
        let mut prefix = String::new();
        let mut chars = self.source.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' | '?' | '[' => break,
                '\\' => match chars.next() {
                    Some(escaped) => prefix.push(escaped),
                    None => prefix.push('\\'),
                },
                other => prefix.push(other),
            }
        }
        prefix
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn glob_to_regex(glob: &str) -> std::result::Result<String, &'static str> {
    let bytes = glob.as_bytes();
    let mut out = String::with_capacity(bytes.len() * 2 + 8);
    out.push_str("(?s-u)^");

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'*' => {
                out.push_str(".*");
                i += 1;
            }
            b'?' => {
                out.push('.');
                i += 1;
            }
            b'\\' if i + 1 < bytes.len() => {
                push_literal(&mut out, bytes[i + 1]);
                i += 2;
            }
            b'[' => {
                i = push_class(bytes, i + 1, &mut out)?;
            }
            // A trailing backslash matches itself, as in Redis.
            b => {
                push_literal(&mut out, b);
                i += 1;
            }
        }
    }

    out.push('$');
    Ok(out)
}

/// Translate a `[...]` class starting right after the `[`.
/// Returns the index just past the closing `]`.
fn push_class(
    bytes: &[u8],
    start: usize,
    out: &mut String,
) -> std::result::Result<usize, &'static str> {
    const UNTERMINATED: &str = "unterminated character class";

    let mut i = start;
    let negate = bytes.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut ranges: Vec<(u8, u8)> = Vec::new();
    loop {
        let b = *bytes.get(i).ok_or(UNTERMINATED)?;
        if b == b']' {
            i += 1;
            break;
        }

        let lo = if b == b'\\' {
            i += 1;
            *bytes.get(i).ok_or(UNTERMINATED)?
        } else {
            b
        };
        i += 1;

        let is_range = bytes.get(i) == Some(&b'-') && bytes.get(i + 1).is_some_and(|&n| n != b']');
        if is_range {
            let mut hi = bytes[i + 1];
            i += 2;
            if hi == b'\\' {
                hi = *bytes.get(i).ok_or(UNTERMINATED)?;
                i += 1;
            }
            // Redis accepts reversed ranges.
            ranges.push(if lo <= hi { (lo, hi) } else { (hi, lo) });
        } else {
            ranges.push((lo, lo));
        }
    }

    if ranges.is_empty() {
        return Err("empty character class");
    }

    out.push('[');
    if negate {
        out.push('^');
    }
    for (lo, hi) in ranges {
        push_class_byte(out, lo);
        if lo != hi {
            out.push('-');
            push_class_byte(out, hi);
        }
    }
    out.push(']');
    Ok(i)
}

// Redis compares raw bytes, so anything outside printable ASCII is written
// as a `\xNN` byte escape.
fn push_literal(out: &mut String, b: u8) {
    if b.is_ascii_graphic() || b == b' ' {
        out.push_str(&regex::escape(&char::from(b).to_string()));
    } else {
        push_hex(out, b);
    }
}

fn push_class_byte(out: &mut String, b: u8) {
    if !(b.is_ascii_graphic() || b == b' ') {
        push_hex(out, b);
        return;
    }
    if matches!(b, b'\\' | b']' | b'[' | b'^' | b'-' | b'&' | b'~') {
        out.push('\\');
    }
    out.push(char::from(b));
}

fn push_hex(out: &mut String, b: u8) {
    out.push_str(&format!("\\x{b:02X}"));
}
