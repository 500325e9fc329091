//! Formatters: rewrite text in place.

use std::borrow::Cow;

use regex::Regex;

use common_error::{StrataError, StrataResult};
use strata_core::{Record, Value};
use strata_engine::MapFn;
use strata_logical::{Constraint, ParamSchema, ParamSpec, ParamType, Params};

use crate::common::{flag, on_param, text_at, to_param};

fn compile(pattern: &str) -> StrataResult<Regex> {
    Regex::new(pattern).map_err(|e| StrataError::internal(format!("bad pattern {pattern:?}: {e}")))
}

/// Replace every newline that has no newline neighbour with a space.
fn collapse_single_newlines(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let lone = c == '\n'
                && (i == 0 || chars[i - 1] != '\n')
                && chars.get(i + 1) != Some(&'\n');
            if lone {
                ' '
            } else {
                c
            }
        })
        .collect()
}

// ============================================================================
// Spacing
// ============================================================================

/// Repairs whitespace damage typical of OCR and PDF extraction.
#[derive(Debug, Clone)]
pub struct SpacingFormatter {
    on: String,
    to: String,
    normalize_whitespace: bool,
    normalize_line_breaks: bool,
    fix_hyphenation: bool,
    collapse_paragraph_breaks: bool,
    blanks: Regex,
    blank_lines: Regex,
    hyphen_breaks: Regex,
    double_spaces: Regex,
}

impl SpacingFormatter {
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(on_param("text"))
            .param(to_param("text"))
            .param(flag(
                "normalize_whitespace",
                true,
                "Collapse runs of spaces and tabs",
            ))
            .param(flag(
                "normalize_line_breaks",
                true,
                "Reduce three or more newlines to a paragraph break",
            ))
            .param(flag(
                "fix_hyphenation",
                true,
                "Join words hyphenated across a line break",
            ))
            .param(flag(
                "collapse_paragraph_breaks",
                true,
                "Turn line breaks inside a paragraph into spaces",
            ))
    }

    pub fn from_params(params: &Params) -> StrataResult<Self> {
        Ok(Self {
            on: params.str("on")?.to_string(),
            to: params.str("to")?.to_string(),
            normalize_whitespace: params.bool("normalize_whitespace")?,
            normalize_line_breaks: params.bool("normalize_line_breaks")?,
            fix_hyphenation: params.bool("fix_hyphenation")?,
            collapse_paragraph_breaks: params.bool("collapse_paragraph_breaks")?,
            blanks: compile(r"[ \t]+")?,
            blank_lines: compile(r"\n{3,}")?,
            hyphen_breaks: compile(r"(\w)-\s*\n\s*(\w)")?,
            double_spaces: compile(r"  +")?,
        })
    }

    pub fn format(&self, text: &str) -> String {
        let mut text = Cow::Borrowed(text);
        if self.normalize_whitespace {
            text = Cow::Owned(self.blanks.replace_all(&text, " ").into_owned());
        }
        if self.normalize_line_breaks {
            text = Cow::Owned(self.blank_lines.replace_all(&text, "\n\n").into_owned());
        }
        if self.fix_hyphenation {
            text = Cow::Owned(self.hyphen_breaks.replace_all(&text, "$1$2").into_owned());
        }
        if self.collapse_paragraph_breaks {
            text = Cow::Owned(collapse_single_newlines(&text));
        }
        self.double_spaces.replace_all(&text, " ").into_owned()
    }
}

impl MapFn for SpacingFormatter {
    fn apply(&self, record: &Record) -> StrataResult<Option<Record>> {
        match text_at(record, &self.on)? {
            Some(text) if !text.is_empty() => {
                let formatted = self.format(text);
                Ok(Some(record.clone().with_field(&self.to, formatted)?))
            }
            _ => Ok(Some(record.clone())),
        }
    }

    fn input_fields(&self) -> Vec<String> {
        vec![self.on.clone()]
    }

    fn output_fields(&self) -> Vec<String> {
        vec![self.to.clone()]
    }
}

// ============================================================================
// PII
// ============================================================================

const EMAIL: &str = r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b";
const IP_ADDRESS: &str =
    r"\b(?:(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\b";

/// Replaces email and IPv4 addresses with harmless placeholders.
#[derive(Debug, Clone)]
pub struct PiiFormatter {
    on: String,
    to: String,
    rules: Vec<(Regex, String)>,
}

impl PiiFormatter {
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(on_param("text"))
            .param(to_param("text"))
            .param(
                ParamSpec::new("email_replacement", ParamType::String)
                    .with_default("name@example.com")
                    .describe("Text substituted for email addresses"),
            )
            .param(
                ParamSpec::new("ip_replacement", ParamType::String)
                    .with_default("192.0.2.255")
                    .describe("Text substituted for IPv4 addresses"),
            )
            .param(
                ParamSpec::new("entities", ParamType::StringList)
                    .with_default(Value::Array(vec![
                        Value::from("email"),
                        Value::from("ip_address"),
                    ]))
                    .constraint(Constraint::OneOf(vec![
                        "email".to_string(),
                        "ip_address".to_string(),
                    ]))
                    .describe("Entity kinds to replace"),
            )
    }

    pub fn from_params(params: &Params) -> StrataResult<Self> {
        let entities = params.str_list("entities")?;
        let mut rules = Vec::with_capacity(entities.len());
        for entity in &entities {
            let rule = match entity.as_str() {
                "email" => (compile(EMAIL)?, params.str("email_replacement")?.to_string()),
                "ip_address" => (compile(IP_ADDRESS)?, params.str("ip_replacement")?.to_string()),
                other => {
                    return Err(StrataError::invalid_parameter(
                        params.component(),
                        "entities",
                        format!("unknown entity '{other}'"),
                    ))
                }
            };
            rules.push(rule);
        }
        Ok(Self {
            on: params.str("on")?.to_string(),
            to: params.str("to")?.to_string(),
            rules,
        })
    }

    pub fn redact(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |text, (pattern, replacement)| {
                pattern
                    .replace_all(&text, regex::NoExpand(replacement))
                    .into_owned()
            })
    }
}

impl MapFn for PiiFormatter {
    fn apply(&self, record: &Record) -> StrataResult<Option<Record>> {
        match text_at(record, &self.on)? {
            Some(text) => {
                let redacted = self.redact(text);
                Ok(Some(record.clone().with_field(&self.to, redacted)?))
            }
            None => Ok(Some(record.clone())),
        }
    }

    fn input_fields(&self) -> Vec<String> {
        vec![self.on.clone()]
    }

    fn output_fields(&self) -> Vec<String> {
        vec![self.to.clone()]
    }
}
