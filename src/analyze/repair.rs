// src/analyze/repair.rs
//! Response repair: raw model text -> best-effort `Analysis`.
//!
//! Recovery is an ordered list of strategies. Each one is total (never panics, never
//! errors) and returns `Option<Analysis>`; the first `Some` wins:
//!
//! 1. `direct`     – cut the preamble before the first `{`, take the depth-balanced block, decode.
//! 2. `cleaned`    – same block with trailing separators removed and raw line breaks/tabs flattened.
//! 3. `balanced`   – for truncated output: close an open string, append one closer per open
//!                   `{`/`[` (innermost first), clean, decode.
//! 4. `summary`    – regex for just the `executive_summary` string; builds a minimal record.
//!
//! `None` from every strategy means no usable record.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::Analysis;

/// Which strategy produced the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    Cleaned,
    Balanced,
    SummaryOnly,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Cleaned => "cleaned",
            Strategy::Balanced => "balanced",
            Strategy::SummaryOnly => "summary_only",
        }
    }
}

type StrategyFn = fn(&str) -> Option<Analysis>;

const STRATEGIES: &[(Strategy, StrategyFn)] = &[
    (Strategy::Direct, direct),
    (Strategy::Cleaned, cleaned),
    (Strategy::Balanced, balanced),
    (Strategy::SummaryOnly, summary_only),
];

static SUMMARY_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""executive_summary"\s*:\s*"((?:[^"\\]|\\.)*)"#).expect("valid summary regex")
});

/// Runs the cascade and returns the recovered record, if any.
pub fn repair_response(raw: &str) -> Option<Analysis> {
    repair_with_strategy(raw).map(|(a, _)| a)
}

/// Same as [`repair_response`] but also reports which strategy succeeded.
pub fn repair_with_strategy(raw: &str) -> Option<(Analysis, Strategy)> {
    for (kind, strategy) in STRATEGIES {
        if let Some(a) = strategy(raw) {
            debug!(target: "repair", strategy = kind.as_str(), "recovered analysis");
            return Some((a, *kind));
        }
    }
    debug!(target: "repair", preview = %preview(raw), "no usable record");
    None
}

// ------------------------------------------------------------
// Block scanning
// ------------------------------------------------------------

/// Result of scanning from the first `{`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'a> {
    /// Text from the first `{` through its matching `}`, or to the end when truncated.
    pub text: &'a str,
    /// Openers still unclosed at the end of `text`, outermost first.
    pub open: Vec<char>,
    /// Scan ended inside a string literal (odd number of unescaped quotes).
    pub open_string: bool,
}

impl Block<'_> {
    pub fn is_complete(&self) -> bool {
        self.open.is_empty() && !self.open_string
    }
}

/// Finds the first `{` and tracks nesting of `{}`/`[]` (ignoring string contents) until
/// depth returns to zero. Everything before the opener is treated as preamble.
pub fn scan_block(raw: &str) -> Option<Block<'_>> {
    let start = raw.find('{')?;
    let body = &raw[start..];
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => stack.push(ch),
            '}' | ']' => {
                stack.pop();
                if stack.is_empty() {
                    return Some(Block {
                        text: &body[..i + ch.len_utf8()],
                        open: Vec::new(),
                        open_string: false,
                    });
                }
            }
            _ => {}
        }
    }

    Some(Block {
        text: body,
        open: stack,
        open_string: in_string,
    })
}

/// Removes `,` before a closer and flattens raw line breaks/tabs to spaces.
/// Inside string literals only the line breaks are touched.
pub fn clean(block: &str) -> String {
    let mut out = String::with_capacity(block.len());
    let mut in_string = false;
    let mut escaped = false;
    // Byte offset in `out` of a separator that may still turn out to be trailing.
    let mut separator: Option<usize> = None;

    for ch in block.chars() {
        let ch = if matches!(ch, '\n' | '\r' | '\t') { ' ' } else { ch };
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }
        match ch {
            ',' => separator = Some(out.len()),
            '}' | ']' => {
                if let Some(at) = separator.take() {
                    out.remove(at);
                }
            }
            c if c.is_whitespace() => {}
            '"' => {
                separator = None;
                in_string = true;
            }
            _ => separator = None,
        }
        out.push(ch);
    }
    out
}

/// Appends a quote if a string is left open, then one closer per unclosed opener.
pub fn close_truncated(block: &Block<'_>) -> String {
    let mut out = String::with_capacity(block.text.len() + block.open.len() + 1);
    out.push_str(block.text);
    if block.open_string {
        out.push('"');
    }
    for opener in block.open.iter().rev() {
        out.push(if *opener == '[' { ']' } else { '}' });
    }
    out
}

fn decode(text: &str) -> Option<Analysis> {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| Analysis::from_value(&v))
}

// ------------------------------------------------------------
// Strategies
// ------------------------------------------------------------

fn direct(raw: &str) -> Option<Analysis> {
    let block = scan_block(raw)?;
    if !block.is_complete() {
        return None;
    }
    decode(block.text)
}

fn cleaned(raw: &str) -> Option<Analysis> {
    let block = scan_block(raw)?;
    if !block.is_complete() {
        return None;
    }
    decode(&clean(block.text))
}

fn balanced(raw: &str) -> Option<Analysis> {
    let block = scan_block(raw)?;
    if block.is_complete() {
        return None;
    }
    let closed = close_truncated(&block);
    decode(&closed).or_else(|| decode(&clean(&closed)))
}

fn summary_only(raw: &str) -> Option<Analysis> {
    let caps = SUMMARY_FIELD.captures(raw)?;
    let summary = caps
        .get(1)?
        .as_str()
        .replace("\\\"", "\"")
        .replace("\\n", " ")
        .replace("\\t", " ");
    let summary = summary.trim();
    if summary.is_empty() {
        return None;
    }
    Some(Analysis::from_summary(summary))
}

fn preview(raw: &str) -> String {
    raw.chars()
        .take(120)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{Urgency, NOT_AVAILABLE};

    #[test]
    fn preamble_is_ignored() {
        let raw = "THOUGHT: let me think about rates.\nHere it is:\n{\"executive_summary\": \"ok\", \"importance_score\": 7}";
        let (a, s) = repair_with_strategy(raw).unwrap();
        assert_eq!(s, Strategy::Direct);
        assert_eq!(a.executive_summary, "ok");
        assert_eq!(a.importance_score, 7);
    }

    #[test]
    fn scan_finds_the_complete_nested_block() {
        let raw = r#"x {"a": {"b": [1, {"c": "}"}]}, "d": 1} trailing {"e": 2}"#;
        let block = scan_block(raw).unwrap();
        assert_eq!(block.text, r#"{"a": {"b": [1, {"c": "}"}]}, "d": 1}"#);
        assert!(block.is_complete());
    }

    #[test]
    fn trailing_commas_and_raw_newlines_are_cleaned() {
        let raw = "{\"executive_summary\": \"line one\nline two\", \"keywords\": [\"a\", \"b\",],}";
        let (a, s) = repair_with_strategy(raw).unwrap();
        assert_eq!(s, Strategy::Cleaned);
        assert_eq!(a.executive_summary, "line one line two");
        assert_eq!(a.keywords, vec!["a", "b"]);
    }

    #[test]
    fn cleaning_leaves_string_contents_alone() {
        let raw = "{\"executive_summary\": \"ranges a, ] and b,}\", \"keywords\": [\"x\", ],\n}";
        assert_eq!(
            clean(raw),
            "{\"executive_summary\": \"ranges a, ] and b,}\", \"keywords\": [\"x\" ] }"
        );
        let (a, s) = repair_with_strategy(raw).unwrap();
        assert_eq!(s, Strategy::Cleaned);
        assert_eq!(a.executive_summary, "ranges a, ] and b,}");
        assert_eq!(a.keywords, vec!["x"]);
    }

    #[test]
    fn truncated_block_is_closed_innermost_first() {
        let raw = r#"{"executive_summary": "s", "risks_opportunities": {"main_risks": ["x", "y""#;
        let block = scan_block(raw).unwrap();
        assert_eq!(block.open, vec!['{', '{', '[']);
        assert_eq!(close_truncated(&block), format!("{raw}]}}}}"));
        let (a, s) = repair_with_strategy(raw).unwrap();
        assert_eq!(s, Strategy::Balanced);
        assert_eq!(a.risks_opportunities.main_risks, vec!["x", "y"]);
    }

    #[test]
    fn open_string_gets_one_quote() {
        let raw = r#"{"executive_summary": "cut off mid sent"#;
        let block = scan_block(raw).unwrap();
        assert!(block.open_string);
        let closed = close_truncated(&block);
        assert_eq!(closed, format!("{raw}\"}}"));
        let a = repair_response(raw).unwrap();
        assert_eq!(a.executive_summary, "cut off mid sent");
    }

    #[test]
    fn escaped_quotes_do_not_flip_string_state() {
        let raw = r#"{"executive_summary": "he said \"hold\" today"}"#;
        let a = repair_response(raw).unwrap();
        assert_eq!(a.executive_summary, "he said \"hold\" today");
    }

    #[test]
    fn summary_regex_is_last_resort() {
        // Unquoted key breaks decoding even after balancing.
        let raw = r#"{"executive_summary": "Oil jumps on supply cut", importance: high"#;
        let (a, s) = repair_with_strategy(raw).unwrap();
        assert_eq!(s, Strategy::SummaryOnly);
        assert_eq!(a.executive_summary, "Oil jumps on supply cut");
        assert_eq!(a.importance_score, 5);
        assert_eq!(a.urgency, Urgency::Monitoring);
        assert_eq!(a.localized_title, NOT_AVAILABLE);
        assert!(a.policy_considerations.is_empty());
    }

    #[test]
    fn garbage_yields_no_record() {
        assert!(repair_response("").is_none());
        assert!(repair_response("I cannot help with that.").is_none());
        assert!(repair_response("{{{{ nope").is_none());
        assert!(repair_response("[1, 2, 3]").is_none());
    }

    #[test]
    fn empty_summary_capture_is_not_a_record() {
        assert!(repair_response(r#"{"executive_summary": "", broken"#).is_none());
    }
}
