// src/parse/extractor.rs
//! Field extraction: one block of classifier text -> flat label/value map.
//!
//! The classifier answers with a numbered "Label: value" list, usually wrapped
//! in markdown and sometimes followed by a chatty sentence or a second,
//! repeated list. Only the first labeled run is used.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

use super::labels::{canonical_field, Field};

/// Labels longer than this are prose that happens to contain a colon.
const MAX_LABEL_CHARS: usize = 48;
const MAX_LABEL_WORDS: usize = 6;

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s{0,3}#{1,6}\s*").expect("heading regex"));
static RE_EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*{1,3}|_{2,3}|`+").expect("emphasis regex"));
static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[-•·–]\s+").expect("bullet regex"));
static RE_ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\(?(\d{1,3})\s*[.)\-:]|(\d{1,3})\s+)\s*").expect("ordinal regex"));
static RE_ANSWER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:answer|cevap|yan[ıi]t|output|response|[çc][ıi]kt[ıi]|sonu[çc])\s*[:：]\s*")
        .expect("answer regex")
});

/// Canonical fields plus anything that looked like a label but is not known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldMap {
    fields: BTreeMap<Field, String>,
    other: Vec<(String, String)>,
}

impl FieldMap {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// First occurrence wins; a repeated label later in the block is kept in `other`.
    pub fn insert(&mut self, field: Field, value: impl Into<String>) -> bool {
        if self.fields.contains_key(&field) {
            return false;
        }
        self.fields.insert(field, value.into());
        true
    }

    pub fn push_other(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.other.push((label.into(), value.into()));
    }

    pub fn other(&self) -> &[(String, String)] {
        &self.other
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub fields: FieldMap,
    pub structured_block_found: bool,
}

/// A line that parsed as `[ordinal] label: value`.
#[derive(Debug, Clone)]
struct Candidate {
    ordinal: Option<u32>,
    label: String,
    value: String,
    field: Option<Field>,
}

/// Extract the first labeled block from classifier output.
pub fn extract(raw: &str) -> Extraction {
    let cleaned = clean_text(raw);
    let lines: Vec<&str> = cleaned.lines().collect();

    // Block starts at the first candidate line carrying a known label.
    let Some(start) = lines
        .iter()
        .position(|l| parse_line(l).is_some_and(|c| c.field.is_some()))
    else {
        return Extraction::default();
    };

    let mut map = FieldMap::default();
    let mut last_ordinal: Option<u32> = None;
    let mut i = start;

    while i < lines.len() {
        let line = lines[i];

        if line.trim().is_empty() {
            // A blank line only continues the block if a known label follows.
            let next = lines[i + 1..].iter().find(|l| !l.trim().is_empty());
            match next.and_then(|l| parse_line(l)) {
                Some(c) if c.field.is_some() && !restarts(last_ordinal, c.ordinal) => {
                    i += 1;
                    continue;
                }
                _ => break,
            }
        }

        let Some(c) = parse_line(line) else {
            break; // trailing prose
        };
        if restarts(last_ordinal, c.ordinal) {
            break; // a second numbered block
        }
        if c.ordinal.is_some() {
            last_ordinal = c.ordinal;
        }
        i += 1;
        if c.value.is_empty() {
            continue;
        }
        match c.field {
            Some(f) => {
                if !map.insert(f, c.value.clone()) {
                    map.push_other(c.label, c.value);
                }
            }
            None => map.push_other(c.label, c.value),
        }
    }

    Extraction {
        structured_block_found: !map.is_empty(),
        fields: map,
    }
}

/// Numbering that goes back to (or below) the previous ordinal starts a new list.
fn restarts(last: Option<u32>, current: Option<u32>) -> bool {
    matches!((last, current), (Some(prev), Some(cur)) if cur <= prev)
}

fn parse_line(line: &str) -> Option<Candidate> {
    let mut rest = RE_BULLET.replace(line, "").into_owned();

    let mut ordinal = None;
    if let Some(caps) = RE_ORDINAL.captures(&rest) {
        ordinal = caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse::<u32>().ok());
        let end = caps.get(0).map(|m| m.end()).unwrap_or(0);
        rest = rest[end..].to_string();
    }

    // Split on the first colon only; values may contain more (times, URLs).
    let (label, value) = rest.split_once(':')?;
    let label = label.trim().trim_matches(|c: char| c == '"' || c == '\'');
    let value = value.trim();
    // Empty values are kept so a blank "Fiyat:" line does not end the block.
    if label.is_empty() {
        return None;
    }
    if label.chars().count() > MAX_LABEL_CHARS || label.split_whitespace().count() > MAX_LABEL_WORDS {
        return None;
    }
    if label.ends_with(['.', '!', '?']) {
        return None;
    }

    Some(Candidate {
        ordinal,
        label: label.to_string(),
        value: value.to_string(),
        field: canonical_field(label),
    })
}

/// Strip markdown decoration and normalize punctuation so line matching is
/// stable: HTML entities, headings, emphasis, curly quotes and look-alike colons.
pub fn clean_text(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    let unified: String = decoded
        .chars()
        .filter(|c| *c != '\r')
        .map(|c| match c {
            '\u{FF1A}' | '\u{FE55}' | '\u{FE13}' | '\u{A789}' | '\u{2236}' | '\u{02D0}' => ':',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{00AB}' | '\u{00BB}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' => '\'',
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => ' ',
            c => c,
        })
        .collect();

    let mut out = String::with_capacity(unified.len());
    let mut seen_content = false;
    for line in unified.split('\n') {
        let mut l = RE_HEADING.replace(line, "").into_owned();
        l = RE_EMPHASIS.replace_all(&l, "").into_owned();

        // Leading "Answer:" label; keep whatever follows it on the same line.
        if !seen_content && RE_ANSWER.is_match(&l) {
            l = RE_ANSWER.replace(&l, "").into_owned();
        }
        if !l.trim().is_empty() {
            seen_content = true;
        }
        out.push_str(l.trim_end());
        out.push('\n');
    }
    out
}
