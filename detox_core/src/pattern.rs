//! Shell-style glob patterns over site and dataset names.

use regex::Regex;
use std::fmt;

use crate::error::{DetoxError, Result};

/// A glob compiled into a whole-string anchored regex.
///
/// `*` matches any run of characters other than `/` and `?` matches one such
/// character, so `/*/*/RECO` never matches a deeper path. `[...]` and `[!...]`
/// character classes are supported. Everything else matches literally.
#[derive(Debug, Clone)]
pub struct Pattern {
    text: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(glob: &str) -> Result<Self> {
        let regex = Regex::new(&translate(glob)).map_err(|source| DetoxError::InvalidPattern {
            pattern: glob.to_string(),
            source,
        })?;

        Ok(Self {
            text: glob.to_string(),
            regex,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn translate(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                // an unterminated bracket is a literal
                None => out.push_str(r"\["),
                Some(len) => {
                    let class = &chars[i + 1..i + 1 + len];
                    out.push('[');
                    for (n, &c) in class.iter().enumerate() {
                        match c {
                            '!' if n == 0 => out.push('^'),
                            '^' if n == 0 => out.push_str(r"\^"),
                            '\\' | '[' | '&' | '~' => {
                                out.push('\\');
                                out.push(c);
                            }
                            _ => out.push(c),
                        }
                    }
                    out.push(']');
                    i += len + 1;
                }
            },
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}
