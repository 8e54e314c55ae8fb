use std::{collections::HashMap, ops::Range, sync::OnceLock};

use anyhow::bail;
use chrono::NaiveDate;
use log::warn;
use regex::Regex;

const MARKER: &str = "---";

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // `key:` at line start; list items and comments never declare a key
    PATTERN.get_or_init(|| Regex::new(r"^[ \t]*([^\s:#-][^:]*?)[ \t]*:[ \t]*").unwrap())
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap())
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct Block<'a> {
    pub content: &'a str,
    /// Byte offsets of `content` within the document.
    pub span: Range<usize>,
}

fn is_marker(line: &str) -> bool {
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.trim_end_matches([' ', '\t']) == MARKER
}

/// Returns the line starting at `from` (without `\n`) and the offset of the
/// next line, or `None` for the offset when the text ends without a line break.
fn line_at(text: &str, from: usize) -> (&str, Option<usize>) {
    match text[from..].find('\n') {
        Some(i) => (&text[from..from + i], Some(from + i + 1)),
        None => (&text[from..], None),
    }
}

/// Locates a `---` delimited block starting at offset 0.
///
/// The opening marker must be followed by a line break; the block ends at
/// the first following marker line. A document whose block is never closed
/// has no block at all.
pub(crate) fn locate(text: &str) -> Option<Block<'_>> {
    let (first, next) = line_at(text, 0);
    if !is_marker(first) {
        return None;
    }
    let start = next?;
    let mut offset = start;
    while offset < text.len() {
        let (line, next) = line_at(text, offset);
        if is_marker(line) {
            return Some(Block {
                content: &text[start..offset],
                span: start..offset,
            });
        }
        offset = next?;
    }
    None
}

/// Strips surrounding whitespace and one layer of matching quotes.
pub(crate) fn decode(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 {
        if let Some(inner) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
            return inner.replace("''", "'");
        }
        if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
            return inner.to_string();
        }
    }
    raw.to_string()
}

/// Single-quotes a value containing whitespace, `:`, `'` or `\`, or one
/// starting with `"`, which would otherwise lose its quotes on reading.
pub(crate) fn escape(value: &str) -> String {
    if value.starts_with('"')
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ':' | '\'' | '\\'))
    {
        format!("'{}'", value.replace('\'', "''"))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone)]
struct Line {
    text: String,
    eol: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct Field {
    line: usize,
    value_start: usize,
}

/// Parsed metadata block: raw lines plus an index of the keys they declare.
///
/// Edits happen on the lines; [`FrontMatter::apply_to`] splices the result
/// back into the document, so nothing outside `span` is ever touched.
#[derive(Debug, Clone)]
pub(crate) struct FrontMatter {
    span: Range<usize>,
    lines: Vec<Line>,
    fields: HashMap<String, Field>,
    eol: &'static str,
}

impl FrontMatter {
    pub fn parse(text: &str) -> Option<Self> {
        let block = locate(text)?;
        let eol = if text[..block.span.start].ends_with("\r\n") {
            "\r\n"
        } else {
            "\n"
        };

        let lines = block
            .content
            .split_inclusive('\n')
            .map(|raw| {
                if let Some(text) = raw.strip_suffix("\r\n") {
                    Line { text: text.to_string(), eol: "\r\n" }
                } else if let Some(text) = raw.strip_suffix('\n') {
                    Line { text: text.to_string(), eol: "\n" }
                } else {
                    Line { text: raw.to_string(), eol: "" }
                }
            })
            .collect();

        let mut front_matter = Self {
            span: block.span,
            lines,
            fields: HashMap::new(),
            eol,
        };
        front_matter.reindex();
        Some(front_matter)
    }

    fn reindex(&mut self) {
        self.fields.clear();
        for (i, line) in self.lines.iter().enumerate() {
            if let Some(caps) = key_pattern().captures(&line.text) {
                let key = caps[1].to_lowercase();
                let value_start = caps.get(0).map_or(0, |m| m.end());
                self.fields.entry(key).or_insert(Field {
                    line: i,
                    value_start,
                });
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(&key.to_lowercase())
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        let field = self.fields.get(&key.to_lowercase())?;
        Some(self.lines[field.line].text[field.value_start..].trim_end())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = decode(self.raw(key)?);
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// First `YYYY-MM-DD` found inside the value of `key`.
    pub fn date(&self, key: &str) -> Option<NaiveDate> {
        let value = self.get(key)?;
        let found = date_pattern().find(&value)?;
        match NaiveDate::parse_from_str(found.as_str(), "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(e) => {
                warn!("Ignoring invalid date {:?} in `{key}`: {e}", found.as_str());
                None
            }
        }
    }

    /// Sets `key` to `value`, appending a new line when the key is absent.
    /// Returns whether the block changed.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<bool> {
        self.upsert(key, value, None)
    }

    /// Like [`FrontMatter::set`], but a new line goes right after the line
    /// declaring `anchor` when there is one.
    pub fn insert_after(&mut self, anchor: &str, key: &str, value: &str) -> anyhow::Result<bool> {
        self.upsert(key, value, Some(anchor))
    }

    fn upsert(&mut self, key: &str, value: &str, anchor: Option<&str>) -> anyhow::Result<bool> {
        if value.contains(['\n', '\r']) {
            bail!("value for `{key}` must be a single line: {value:?}");
        }

        if let Some(field) = self.fields.get(&key.to_lowercase()).copied() {
            if self.get(key).unwrap_or_default() == value {
                return Ok(false);
            }
            let line = &mut self.lines[field.line];
            line.text.truncate(field.value_start);
            line.text.push_str(&escape(value));
            return Ok(true);
        }

        let position = anchor
            .and_then(|anchor| self.fields.get(&anchor.to_lowercase()))
            .map(|field| field.line + 1)
            .unwrap_or_else(|| {
                // keep trailing blank lines after the new one
                self.lines
                    .iter()
                    .rposition(|l| !l.text.trim().is_empty())
                    .map_or(0, |i| i + 1)
            });
        // every content line is terminated: the closing marker follows it
        let eol = if position > 0 {
            self.lines[position - 1].eol
        } else {
            self.eol
        };
        self.lines.insert(
            position,
            Line {
                text: format!("{key}: {}", escape(value)),
                eol,
            },
        );
        self.reindex();
        Ok(true)
    }

    pub fn content(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push_str(line.eol);
        }
        out
    }

    pub fn apply_to(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 64);
        out.push_str(&text[..self.span.start]);
        out.push_str(&self.content());
        out.push_str(&text[self.span.end..]);
        out
    }
}

/// Inserts or updates `key` in the document's metadata block.
///
/// Returns the new text and whether anything changed. A document without a
/// block is returned unchanged.
pub(crate) fn update_field(text: &str, key: &str, value: &str) -> anyhow::Result<(String, bool)> {
    let Some(mut front_matter) = FrontMatter::parse(text) else {
        return Ok((text.to_string(), false));
    };
    if front_matter.set(key, value)? {
        Ok((front_matter.apply_to(text), true))
    } else {
        Ok((text.to_string(), false))
    }
}
