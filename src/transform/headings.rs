// src/transform/headings.rs
//! Line post-pass that turns patch-note section markers into headings.
//!
//! Per line, first match wins:
//! 1. `[ SECTION ]` alone on a line      → `### SECTION`
//! 2. `Label:` (no indent, no bullet, no other colon) → `#### Label`
//!
//! Everything else passes through untouched.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::borrow::Cow;

fn re_section() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^\s*\[(.+?)\]\s*$").unwrap())
}

fn re_label() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^([^\s*\-+•:][^:]*):$").unwrap())
}

pub fn promote_line(line: &str) -> Cow<'_, str> {
    if let Some(c) = re_section().captures(line) {
        // `[ ]` yields a bare `### ` line.
        return Cow::Owned(format!("### {}", c[1].trim()));
    }
    if let Some(c) = re_label().captures(line) {
        return Cow::Owned(format!("#### {}", c[1].trim()));
    }
    Cow::Borrowed(line)
}

pub fn promote(text: &str) -> String {
    text.split('\n')
        .map(promote_line)
        .collect::<Vec<_>>()
        .join("\n")
}
