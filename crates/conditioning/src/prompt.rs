//! Per-segment prompt resolution.
//!
//! The positive prompt is a multi-line string where a line of the form
//! `[<index>] text` targets one segment. Unindexed segments fall back to
//! index 0, then to the first line; index 0 doubles as the universal
//! fallback for every segment without its own entry.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

static BRACKET_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\d+)\]\s*(.+)$").expect("bracket pattern"));

/// Mapping from segment index to prompt text, built once per invocation.
#[derive(Debug, Clone)]
pub struct PromptIndex {
    indexed: HashMap<usize, String>,
    lines: Vec<String>,
    raw: String,
}

impl PromptIndex {
    /// Parse a raw multi-line prompt.
    ///
    /// Non-blank lines are trimmed; lines matching the bracket syntax
    /// populate the index map, everything else only counts as a plain line.
    /// If the string has no non-blank lines at all, the raw string verbatim
    /// becomes the single fallback line. Duplicate indices keep the last
    /// occurrence.
    pub fn parse(raw: &str) -> Self {
        let mut lines: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if lines.is_empty() {
            lines.push(raw.to_string());
        }

        let mut indexed = HashMap::new();
        for line in &lines {
            if let Some(caps) = BRACKET_LINE.captures(line) {
                // \d+ can still overflow usize; such a line is ignored.
                if let Ok(idx) = caps[1].parse::<usize>() {
                    indexed.insert(idx, caps[2].trim().to_string());
                }
            }
        }

        Self {
            indexed,
            lines,
            raw: raw.to_string(),
        }
    }

    /// Resolve the prompt for one segment: its own index, else index 0,
    /// else the first line, else the raw string.
    pub fn resolve(&self, segment: usize) -> &str {
        if let Some(p) = self.indexed.get(&segment) {
            p
        } else if let Some(p) = self.indexed.get(&0) {
            p
        } else if let Some(l) = self.lines.first() {
            l
        } else {
            &self.raw
        }
    }
}
