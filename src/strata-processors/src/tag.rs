//! Taggers: annotate records with new fields.
//!
//! Taggers never change fields that already exist; the engine rejects any
//! record a tagger modified in place.

use indexmap::IndexMap;
use regex::Regex;

use common_error::{StrataError, StrataResult};
use strata_core::{Record, Value};
use strata_engine::MapFn;
use strata_logical::{Constraint, ParamSchema, ParamSpec, ParamType, Params};

use crate::common::{flag, on_param, text_at, to_param};

// ============================================================================
// Value
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum ValueSource {
    Constant(Value),
    Field(String),
}

/// Writes a constant, or a copy of another field, to `to`.
#[derive(Debug, Clone)]
pub struct ValueTagger {
    source: ValueSource,
    to: String,
}

impl ValueTagger {
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(
                ParamSpec::new("on", ParamType::String)
                    .constraint(Constraint::NonEmpty)
                    .describe("Field to copy the value from"),
            )
            .param(ParamSpec::new("value", ParamType::Any).describe("Constant value to insert"))
            .param(
                ParamSpec::new("to", ParamType::String)
                    .required()
                    .constraint(Constraint::NonEmpty)
                    .describe("Field path to write to"),
            )
    }

    pub fn from_params(params: &Params) -> StrataResult<Self> {
        let source = match (params.opt_str("on")?, params.get("value")) {
            (Some(_), Some(_)) => {
                return Err(StrataError::invalid_parameter(
                    params.component(),
                    "value",
                    "only one of `on` and `value` may be set",
                ))
            }
            (Some(on), None) => ValueSource::Field(on.to_string()),
            (None, Some(value)) => ValueSource::Constant(value.clone()),
            (None, None) => {
                return Err(StrataError::invalid_parameter(
                    params.component(),
                    "value",
                    "one of `on` and `value` is required",
                ))
            }
        };
        Ok(Self {
            source,
            to: params.str("to")?.to_string(),
        })
    }
}

impl MapFn for ValueTagger {
    fn apply(&self, record: &Record) -> StrataResult<Option<Record>> {
        let value = match &self.source {
            ValueSource::Constant(value) => value.clone(),
            ValueSource::Field(path) => record.get(path).cloned().unwrap_or(Value::Null),
        };
        Ok(Some(record.clone().with_field(&self.to, value)?))
    }

    fn input_fields(&self) -> Vec<String> {
        match &self.source {
            ValueSource::Field(path) => vec![path.clone()],
            ValueSource::Constant(_) => Vec::new(),
        }
    }

    fn output_fields(&self) -> Vec<String> {
        vec![self.to.clone()]
    }
}

// ============================================================================
// Length
// ============================================================================

/// Character, word, line and paragraph counts.
#[derive(Debug, Clone)]
pub struct LengthTagger {
    on: String,
    to: String,
    count_characters: bool,
    count_words: bool,
    count_lines: bool,
    count_paragraphs: bool,
    word_delimiter: String,
}

impl LengthTagger {
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(on_param("text"))
            .param(to_param("metadata.length"))
            .param(flag("count_characters", true, "Report `char_count`"))
            .param(flag("count_words", true, "Report `word_count`"))
            .param(flag("count_lines", true, "Report `line_count`"))
            .param(flag("count_paragraphs", false, "Report `paragraph_count`"))
            .param(
                ParamSpec::new("word_delimiter", ParamType::String)
                    .with_default(" ")
                    .constraint(Constraint::NonEmpty)
                    .describe("Delimiter used to split words"),
            )
    }

    pub fn from_params(params: &Params) -> StrataResult<Self> {
        Ok(Self {
            on: params.str("on")?.to_string(),
            to: params.str("to")?.to_string(),
            count_characters: params.bool("count_characters")?,
            count_words: params.bool("count_words")?,
            count_lines: params.bool("count_lines")?,
            count_paragraphs: params.bool("count_paragraphs")?,
            word_delimiter: params.str("word_delimiter")?.to_string(),
        })
    }

    fn stats(&self, text: &str) -> IndexMap<String, Value> {
        let mut stats = IndexMap::new();
        if self.count_characters {
            stats.insert("char_count".to_string(), Value::from(text.chars().count()));
        }
        if self.count_words {
            let words = text
                .split(self.word_delimiter.as_str())
                .filter(|w| !w.trim().is_empty())
                .count();
            stats.insert("word_count".to_string(), Value::from(words));
        }
        if self.count_lines {
            let lines = if text.is_empty() {
                0
            } else {
                text.matches('\n').count() + 1
            };
            stats.insert("line_count".to_string(), Value::from(lines));
        }
        if self.count_paragraphs {
            let paragraphs = text.split("\n\n").filter(|p| !p.trim().is_empty()).count();
            stats.insert("paragraph_count".to_string(), Value::from(paragraphs));
        }
        stats
    }
}

impl MapFn for LengthTagger {
    fn apply(&self, record: &Record) -> StrataResult<Option<Record>> {
        let text = text_at(record, &self.on)?.unwrap_or_default();
        Ok(Some(
            record.clone().with_field(&self.to, self.stats(text))?,
        ))
    }

    fn input_fields(&self) -> Vec<String> {
        vec![self.on.clone()]
    }

    fn output_fields(&self) -> Vec<String> {
        vec![self.to.clone()]
    }
}

// ============================================================================
// N-grams
// ============================================================================

/// Most frequent word n-grams, as `[[ngram, count], ...]`.
#[derive(Debug, Clone)]
pub struct NgramsTagger {
    on: String,
    to: String,
    ngram_size: usize,
    top_k: Option<usize>,
    separators: Regex,
}

impl NgramsTagger {
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(on_param("text"))
            .param(to_param("metadata.ngrams"))
            .param(
                ParamSpec::new("ngram_size", ParamType::Int)
                    .with_default(5i64)
                    .constraint(Constraint::Gt(0.0))
                    .describe("Words per n-gram"),
            )
            .param(
                ParamSpec::new("top_k", ParamType::Int)
                    .constraint(Constraint::Gt(0.0))
                    .describe("Keep only the k most frequent n-grams"),
            )
    }

    pub fn from_params(params: &Params) -> StrataResult<Self> {
        Ok(Self {
            on: params.str("on")?.to_string(),
            to: params.str("to")?.to_string(),
            ngram_size: params.usize("ngram_size")?,
            top_k: params.opt_usize("top_k")?,
            separators: Regex::new(r"[\s\p{P}\p{S}]+")
                .map_err(|e| StrataError::internal(format!("bad pattern: {e}")))?,
        })
    }

    /// Count n-grams, most frequent first; ties keep first-seen order.
    pub fn count(&self, text: &str) -> Vec<(String, usize)> {
        let words: Vec<&str> = self
            .separators
            .split(text)
            .filter(|w| !w.is_empty())
            .collect();
        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for window in words.windows(self.ngram_size) {
            *counts.entry(window.join(" ")).or_default() += 1;
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        if let Some(k) = self.top_k {
            ranked.truncate(k);
        }
        ranked
    }
}

impl MapFn for NgramsTagger {
    fn apply(&self, record: &Record) -> StrataResult<Option<Record>> {
        let ranked = match text_at(record, &self.on)? {
            Some(text) => self.count(text),
            None => Vec::new(),
        };
        let value = Value::Array(
            ranked
                .into_iter()
                .map(|(gram, count)| Value::Array(vec![Value::String(gram), Value::from(count)]))
                .collect(),
        );
        Ok(Some(record.clone().with_field(&self.to, value)?))
    }

    fn input_fields(&self) -> Vec<String> {
        vec![self.on.clone()]
    }

    fn output_fields(&self) -> Vec<String> {
        vec![self.to.clone()]
    }
}

// ============================================================================
// Language
// ============================================================================

const STOPWORDS: &[(&str, &[&str])] = &[
    (
        "de",
        &[
            "aber", "auch", "auf", "das", "dem", "den", "der", "des", "die", "ein", "eine", "es",
            "für", "ich", "im", "ist", "mit", "nicht", "oder", "sich", "sie", "sind", "und",
            "von", "wir", "wird", "zu",
        ],
    ),
    (
        "en",
        &[
            "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "have", "he",
            "is", "it", "not", "of", "on", "or", "she", "that", "the", "they", "this", "to",
            "was", "we", "which", "with", "you",
        ],
    ),
    (
        "es",
        &[
            "al", "como", "con", "del", "el", "es", "está", "la", "las", "lo", "los", "más",
            "muy", "no", "para", "pero", "por", "que", "se", "son", "su", "un", "una", "y",
            "yo",
        ],
    ),
    (
        "fr",
        &[
            "au", "avec", "ce", "dans", "de", "des", "du", "elle", "est", "et", "il", "je",
            "la", "le", "les", "mais", "ne", "nous", "ou", "pas", "pour", "qui", "sa", "son",
            "sont", "sur", "un", "une", "vous",
        ],
    ),
    (
        "it",
        &[
            "alla", "anche", "che", "come", "con", "del", "della", "di", "e", "gli", "il",
            "io", "ma", "nel", "non", "per", "più", "questo", "sono", "un", "una", "è",
        ],
    ),
    (
        "nl",
        &[
            "aan", "als", "bij", "dat", "de", "een", "en", "er", "het", "ik", "is", "je",
            "maar", "met", "naar", "niet", "ook", "op", "van", "voor", "wij", "worden", "zijn",
        ],
    ),
    (
        "pt",
        &[
            "ao", "as", "com", "como", "da", "das", "do", "dos", "e", "em", "eu", "mais", "mas",
            "não", "os", "para", "por", "que", "se", "um", "uma", "você", "é",
        ],
    ),
];

/// Stopword-based language identification.
///
/// Each language scores the share of stopword hits it accounts for among all
/// languages. Texts without any hit are tagged `unknown` with score 0. The
/// result is `{names: [...], scores: [...]}`, best first.
#[derive(Debug, Clone)]
pub struct LanguageTagger {
    on: String,
    to: String,
    k: usize,
    max_chars: usize,
    confidence_threshold: f64,
}

impl LanguageTagger {
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(on_param("text"))
            .param(to_param("language"))
            .param(
                ParamSpec::new("k", ParamType::Int)
                    .with_default(1i64)
                    .constraint(Constraint::Ge(1.0))
                    .constraint(Constraint::Le(10.0))
                    .describe("Number of top predictions to report"),
            )
            .param(
                ParamSpec::new("max_chars", ParamType::Int)
                    .with_default(4096i64)
                    .constraint(Constraint::Gt(0.0))
                    .describe("Characters of text to analyze"),
            )
            .param(
                ParamSpec::new("confidence_threshold", ParamType::Float)
                    .with_default(0.0)
                    .constraint(Constraint::Ge(0.0))
                    .constraint(Constraint::Le(1.0))
                    .describe("Drop predictions scoring below this"),
            )
    }

    pub fn from_params(params: &Params) -> StrataResult<Self> {
        Ok(Self {
            on: params.str("on")?.to_string(),
            to: params.str("to")?.to_string(),
            k: params.usize("k")?,
            max_chars: params.usize("max_chars")?,
            confidence_threshold: params.f64("confidence_threshold")?,
        })
    }

    /// Ranked `(language, score)` predictions for `text`.
    pub fn detect(&self, text: &str) -> Vec<(&'static str, f64)> {
        let sample: String = text.chars().take(self.max_chars).collect::<String>().to_lowercase();
        let mut hits = vec![0usize; STOPWORDS.len()];
        for word in sample.split(|c: char| !c.is_alphabetic()).filter(|w| !w.is_empty()) {
            for (slot, (_, words)) in STOPWORDS.iter().enumerate() {
                if words.contains(&word) {
                    hits[slot] += 1;
                }
            }
        }

        let total: usize = hits.iter().sum();
        if total == 0 {
            return vec![("unknown", 0.0)];
        }
        let mut ranked: Vec<(&'static str, f64)> = STOPWORDS
            .iter()
            .zip(&hits)
            .filter(|(_, &n)| n > 0)
            .map(|((lang, _), &n)| (*lang, n as f64 / total as f64))
            .collect();
        // STOPWORDS is sorted by code, so a stable sort breaks ties by code
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(self.k);
        if self.confidence_threshold > 0.0 {
            ranked.retain(|(_, score)| *score >= self.confidence_threshold);
        }
        if ranked.is_empty() {
            ranked.push(("unknown", 0.0));
        }
        ranked
    }
}

impl MapFn for LanguageTagger {
    fn apply(&self, record: &Record) -> StrataResult<Option<Record>> {
        let predictions = match text_at(record, &self.on)? {
            Some(text) if !text.trim().is_empty() => self.detect(text),
            _ => vec![("unknown", 0.0)],
        };
        let mut result = IndexMap::new();
        result.insert(
            "names".to_string(),
            Value::Array(predictions.iter().map(|(l, _)| Value::from(*l)).collect()),
        );
        result.insert(
            "scores".to_string(),
            Value::Array(predictions.iter().map(|(_, s)| Value::Float64(*s)).collect()),
        );
        Ok(Some(record.clone().with_field(&self.to, result)?))
    }

    fn input_fields(&self) -> Vec<String> {
        vec![self.on.clone()]
    }

    fn output_fields(&self) -> Vec<String> {
        vec![self.to.clone()]
    }
}

/// Top language name in a `{names, scores}` tag, if any.
pub fn top_language(tag: &Value) -> Option<&str> {
    match value_at_map(tag, "names")? {
        Value::String(name) => Some(name),
        Value::Array(names) => names.first().and_then(Value::as_str),
        _ => None,
    }
}

fn value_at_map<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    value.as_map()?.get(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(component: &str, schema: ParamSchema, pairs: &[(&str, Value)]) -> Params {
        let raw = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        schema.validate(component, &raw).unwrap()
    }

    fn language(pairs: &[(&str, Value)]) -> LanguageTagger {
        LanguageTagger::from_params(&params(
            "tagger.language",
            LanguageTagger::param_schema(),
            pairs,
        ))
        .unwrap()
    }

    #[test]
    fn test_value_tagger() {
        let constant = ValueTagger::from_params(&params(
            "tagger.value",
            ValueTagger::param_schema(),
            &[("to", "meta.source".into()), ("value", "crawl".into())],
        ))
        .unwrap();
        let out = constant.apply(&Record::with_text("text", "t")).unwrap().unwrap();
        assert_eq!(out.get_str("meta.source"), Some("crawl"));

        let copy = ValueTagger::from_params(&params(
            "tagger.value",
            ValueTagger::param_schema(),
            &[("to", "backup".into()), ("on", "text".into())],
        ))
        .unwrap();
        assert_eq!(copy.input_fields(), ["text"]);
        let out = copy.apply(&Record::with_text("text", "t")).unwrap().unwrap();
        assert_eq!(out.get_str("backup"), Some("t"));
    }

    #[test]
    fn test_value_tagger_needs_exactly_one_source() {
        let both = params(
            "tagger.value",
            ValueTagger::param_schema(),
            &[("to", "x".into()), ("on", "a".into()), ("value", 1i64.into())],
        );
        assert!(matches!(
            ValueTagger::from_params(&both),
            Err(StrataError::InvalidParameter { .. })
        ));

        let neither = params("tagger.value", ValueTagger::param_schema(), &[("to", "x".into())]);
        assert!(ValueTagger::from_params(&neither).is_err());
    }

    #[test]
    fn test_length_tagger() {
        let tagger = LengthTagger::from_params(&params(
            "tagger.length",
            LengthTagger::param_schema(),
            &[("count_paragraphs", true.into())],
        ))
        .unwrap();
        let out = tagger
            .apply(&Record::with_text("text", "one two  three\nfour\n\nfive"))
            .unwrap()
            .unwrap();

        assert_eq!(out.get("metadata.length.char_count"), Some(&Value::Int64(25)));
        assert_eq!(out.get("metadata.length.word_count"), Some(&Value::Int64(3)));
        assert_eq!(out.get("metadata.length.line_count"), Some(&Value::Int64(4)));
        assert_eq!(out.get("metadata.length.paragraph_count"), Some(&Value::Int64(2)));
    }

    #[test]
    fn test_length_of_missing_text() {
        let tagger = LengthTagger::from_params(&params(
            "tagger.length",
            LengthTagger::param_schema(),
            &[],
        ))
        .unwrap();
        let out = tagger.apply(&Record::new()).unwrap().unwrap();
        assert_eq!(out.get("metadata.length.line_count"), Some(&Value::Int64(0)));
    }

    #[test]
    fn test_ngrams() {
        let tagger = NgramsTagger::from_params(&params(
            "tagger.ngrams",
            NgramsTagger::param_schema(),
            &[("ngram_size", 2i64.into()), ("top_k", 2i64.into())],
        ))
        .unwrap();
        let counts = tagger.count("the cat, the cat! a dog");
        assert_eq!(
            counts,
            [("the cat".to_string(), 2), ("cat the".to_string(), 1)]
        );
        assert!(tagger.count("single").is_empty());
    }

    #[test]
    fn test_language_detection() {
        let tagger = language(&[]);
        assert_eq!(
            tagger.detect("The cat sat on the mat and it was happy")[0].0,
            "en"
        );
        assert_eq!(
            tagger.detect("Le chat est sur le tapis et il est content")[0].0,
            "fr"
        );
        assert_eq!(tagger.detect("Der Hund ist nicht in der Küche")[0].0, "de");
        assert_eq!(tagger.detect("xyzzy plugh"), [("unknown", 0.0)]);
    }

    #[test]
    fn test_language_tag_shape() {
        let tagger = language(&[("k", 2i64.into())]);
        let out = tagger
            .apply(&Record::with_text("text", "Le chat est sur le tapis et il est content"))
            .unwrap()
            .unwrap();
        let tag = out.get("language").unwrap();
        assert_eq!(top_language(tag), Some("fr"));
        let scores = tag.as_map().unwrap()["scores"].as_array().unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0].as_float64().unwrap() >= scores[1].as_float64().unwrap());

        let out = tagger.apply(&Record::with_text("text", "   ")).unwrap().unwrap();
        assert_eq!(top_language(out.get("language").unwrap()), Some("unknown"));
    }

    #[test]
    fn test_confidence_threshold() {
        let tagger = language(&[("confidence_threshold", 0.99.into())]);
        // "la" and "de" are shared between several languages
        assert_eq!(tagger.detect("la de"), [("unknown", 0.0)]);
    }
}
