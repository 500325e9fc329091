//! Extractors: turn raw documents into plain text.

use regex::Regex;

use common_error::{StrataError, StrataResult};
use strata_core::{Record, Value};
use strata_engine::MapFn;
use strata_logical::{ParamSchema, Params};

use crate::common::{flag, on_param, text_at, to_param};

// ============================================================================
// Plain
// ============================================================================

/// Copies text from one field to another unchanged.
#[derive(Debug, Clone)]
pub struct PlainExtractor {
    on: String,
    to: String,
}

impl PlainExtractor {
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(on_param("text"))
            .param(to_param("text"))
    }

    pub fn from_params(params: &Params) -> StrataResult<Self> {
        Ok(Self {
            on: params.str("on")?.to_string(),
            to: params.str("to")?.to_string(),
        })
    }
}

impl MapFn for PlainExtractor {
    fn apply(&self, record: &Record) -> StrataResult<Option<Record>> {
        if self.on == self.to {
            return Ok(Some(record.clone()));
        }
        let text = text_at(record, &self.on)?.map_or(Value::Null, Value::from);
        Ok(Some(record.clone().with_field(&self.to, text)?))
    }

    fn input_fields(&self) -> Vec<String> {
        vec![self.on.clone()]
    }

    fn output_fields(&self) -> Vec<String> {
        vec![self.to.clone()]
    }
}

// ============================================================================
// HTML
// ============================================================================

/// Strips markup from HTML, keeping the readable text.
///
/// Scripts, styles and comments are removed with their content, block-level
/// closing tags become line breaks, the remaining tags are dropped and the
/// common character entities are decoded. A document with no text left
/// yields `null`.
#[derive(Debug, Clone)]
pub struct HtmlExtractor {
    on: String,
    to: String,
    keep_line_breaks: bool,
    hidden: Regex,
    blocks: Regex,
    tags: Regex,
    entities: Regex,
    spaces: Regex,
    blank_lines: Regex,
}

impl HtmlExtractor {
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(on_param("text"))
            .param(to_param("text"))
            .param(flag(
                "keep_line_breaks",
                true,
                "Turn block-level elements into line breaks instead of spaces",
            ))
    }

    pub fn from_params(params: &Params) -> StrataResult<Self> {
        Self::new(
            params.str("on")?,
            params.str("to")?,
            params.bool("keep_line_breaks")?,
        )
    }

    pub fn new(on: &str, to: &str, keep_line_breaks: bool) -> StrataResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| StrataError::internal(format!("bad pattern: {e}")))
        };
        Ok(Self {
            on: on.to_string(),
            to: to.to_string(),
            keep_line_breaks,
            hidden: compile(
                r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<head\b.*?</head\s*>|<!--.*?-->",
            )?,
            blocks: compile(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|blockquote|pre|section|article|table|ul|ol)\s*>")?,
            tags: compile(r"<[^>]*>")?,
            entities: compile(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);")?,
            spaces: compile(r"[ \t\r\x0C\x0B]+")?,
            blank_lines: compile(r"\n{3,}")?,
        })
    }

    /// Extract the readable text of an HTML document.
    pub fn extract(&self, html: &str) -> String {
        let text = self.hidden.replace_all(html, " ");
        let separator = if self.keep_line_breaks { "\n" } else { " " };
        let text = self.blocks.replace_all(&text, separator);
        let text = self.tags.replace_all(&text, " ");
        let text = self
            .entities
            .replace_all(&text, |caps: &regex::Captures<'_>| decode_entity(&caps[1], &caps[0]));
        let text = self.spaces.replace_all(&text, " ");

        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let joined = lines.join("\n");
        self.blank_lines
            .replace_all(&joined, "\n\n")
            .trim()
            .to_string()
    }
}

fn decode_entity(name: &str, raw: &str) -> String {
    let decoded = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                name.strip_prefix('#').and_then(|dec| dec.parse().ok())
            };
            code.and_then(char::from_u32)
        }
    };
    decoded.map_or_else(|| raw.to_string(), String::from)
}

impl MapFn for HtmlExtractor {
    fn apply(&self, record: &Record) -> StrataResult<Option<Record>> {
        let value = match text_at(record, &self.on)? {
            Some(html) => {
                let text = self.extract(html);
                if text.is_empty() {
                    Value::Null
                } else {
                    Value::String(text)
                }
            }
            None => Value::Null,
        };
        Ok(Some(record.clone().with_field(&self.to, value)?))
    }

    fn input_fields(&self) -> Vec<String> {
        vec![self.on.clone()]
    }

    fn output_fields(&self) -> Vec<String> {
        vec![self.to.clone()]
    }
}
