//! Path-mode glob patterns.
//!
//! Patterns follow `fnmatch(3)` with `FNM_PATHNAME`: wildcards never cross a
//! `/` unless written as a `**` segment. A segment starting with `.` is
//! hidden and is only matched by a literal leading `.` in the pattern.
//!
//! | Pattern   | Matches                                             |
//! |-----------|-----------------------------------------------------|
//! | `*`       | any run of characters within one segment            |
//! | `?`       | exactly one character other than `/`                |
//! | `[abc]`   | one character from the class (`[!abc]` negates)     |
//! | `**/`     | zero or more whole segments                         |
//! | `/**`     | as the last segment: everything below, at any depth |
//! | `\x`      | the literal character `x`                           |

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::{Error, Result};

/// Lists every file in a bucket.
pub const DEFAULT_PATTERN: &str = "**/*";

/// Stands in for the leading `.` of hidden segments while matching.
const HIDDEN: char = '\u{0}';

lazy_static! {
    static ref WILDCARD: Regex = Regex::new(r"[*?\[\\]").unwrap();
}

/// A compiled glob pattern.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let translated = translate(pattern);
        let regex = Regex::new(&translated).map_err(|e| Error::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Pattern {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Check a normalized bucket path against the pattern.
    pub fn matches(&self, path: &str) -> bool {
        if path.starts_with('.') || path.contains("/.") {
            self.regex.is_match(&mark_hidden(path))
        } else {
            self.regex.is_match(path)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// The directory part of a pattern that contains no wildcards.
///
/// Listing can start there instead of at the bucket root:
/// `literal_dir("a/b/*/c.txt") == "a/b"`, `literal_dir("**/*") == ""`.
pub fn literal_dir(pattern: &str) -> &str {
    let literal = match WILDCARD.find(pattern) {
        Some(m) => &pattern[..m.start()],
        None => pattern,
    };
    match literal.rfind('/') {
        Some(idx) => literal[..idx].trim_matches('/'),
        None => "",
    }
}

/// Escape every wildcard character so `s` only matches itself.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn mark_hidden(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix('.') {
            Some(rest) => format!("{}{}", HIDDEN, rest),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        let at_segment_start = i == 0 || chars[i - 1] == '/';
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let after = chars.get(i + 2);
                if at_segment_start && after == Some(&'/') {
                    out.push_str(r"(?:[^/\x00]*/)*");
                    i += 3;
                    continue;
                }
                if at_segment_start && after.is_none() {
                    out.push_str(r"[^\x00]*");
                    i += 2;
                    continue;
                }
                out.push_str(r"[^/\x00]*");
                while chars.get(i) == Some(&'*') {
                    i += 1;
                }
                continue;
            }
            '*' => out.push_str(r"[^/\x00]*"),
            '?' => out.push_str(r"[^/\x00]"),
            '.' if at_segment_start => out.push_str(r"\x00"),
            '[' => match bracket(&chars, i) {
                Some((class, next)) => {
                    out.push_str(&class);
                    i = next;
                    continue;
                }
                None => out.push_str(r"\["),
            },
            '\\' => {
                if let Some(&next) = chars.get(i + 1) {
                    if at_segment_start && next == '.' {
                        out.push_str(r"\x00");
                        i += 2;
                        continue;
                    }
                    out.push_str(&regex::escape(&next.to_string()));
                    i += 2;
                    continue;
                }
                out.push_str(r"\\");
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Translate a bracket expression starting at `start`. Returns the regex class
/// and the index just past the closing `]`, or `None` if it never closes.
fn bracket(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut i = start + 1;
    let negated = matches!(chars.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }

    let mut class = String::new();
    let mut first = true;
    loop {
        let c = *chars.get(i)?;
        if c == ']' && !first {
            break;
        }
        first = false;
        match c {
            '\\' => {
                let escaped = *chars.get(i + 1)?;
                if !escaped.is_alphanumeric() {
                    class.push('\\');
                }
                class.push(escaped);
                i += 2;
                continue;
            }
            '[' | ']' | '^' | '&' | '~' => {
                class.push('\\');
                class.push(c);
            }
            '/' => {}
            c => class.push(c),
        }
        i += 1;
    }

    let translated = if negated {
        format!("[^/\\x00{}]", class)
    } else if class.is_empty() {
        // Only `/` was listed, which can never match inside a segment.
        "[^\\s\\S]".to_string()
    } else {
        format!("[{}]", class)
    };
    Some((translated, i + 1))
}
