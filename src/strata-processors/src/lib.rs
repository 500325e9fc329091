//! Built-in components for Strata pipelines.
//!
//! Every component here parses its validated [`Params`](strata_logical::Params)
//! into a typed struct through `from_params` and declares its parameters with
//! `param_schema`. [`register_builtins`] wires all of them, together with the
//! storage readers and writers and the aggregations, into a [`Registry`].
//!
//! | Category  | Names                                |
//! |-----------|--------------------------------------|
//! | extractor | `plain`, `html`                      |
//! | tagger    | `value`, `length`, `ngrams`, `language` |
//! | filter    | `value`, `exists`, `language`, `length` |
//! | formatter | `spacing`, `pii`                     |
//! | reader    | `jsonl`, `csv`, `text`               |
//! | writer    | `jsonl`, `csv`, `null`               |

#![allow(clippy::cast_precision_loss)] // Counts become float scores

pub(crate) mod common;
pub mod extract;
pub mod filter;
pub mod format;
pub mod tag;

use std::sync::{Arc, OnceLock};

use common_error::StrataResult;
use strata_engine::{register_aggregations, FilterFn, MapFn, Registry};
use strata_logical::ComponentCategory;
use strata_storage::{
    CsvReader, CsvWriter, JsonlReader, JsonlWriter, NullWriter, Reader, TextReader, Writer,
};

pub use extract::{HtmlExtractor, PlainExtractor};
pub use filter::{Comparator, ExistsFilter, LanguageFilter, LengthFilter, ValueFilter};
pub use format::{PiiFormatter, SpacingFormatter};
pub use tag::{top_language, LanguageTagger, LengthTagger, NgramsTagger, ValueTagger};

/// Register a map-kind component whose type has `param_schema` and
/// `from_params`.
macro_rules! map_component {
    ($registry:expr, $category:expr, $name:literal, $ty:ty, $desc:literal) => {
        $registry.register_map($category, $name, $desc, <$ty>::param_schema(), |params| {
            Ok(Arc::new(<$ty>::from_params(params)?) as Arc<dyn MapFn>)
        })?
    };
}

macro_rules! filter_component {
    ($registry:expr, $name:literal, $ty:ty, $desc:literal) => {
        $registry.register_filter($name, $desc, <$ty>::param_schema(), |params| {
            Ok(Arc::new(<$ty>::from_params(params)?) as Arc<dyn FilterFn>)
        })?
    };
}

/// Register every built-in component into `registry`.
///
/// Fails with `DuplicateComponent` if any built-in name is already taken.
pub fn register_builtins(registry: &mut Registry) -> StrataResult<()> {
    use ComponentCategory::{Extractor, Formatter, Tagger};

    map_component!(registry, Extractor, "plain", PlainExtractor, "Copy text between fields");
    map_component!(registry, Extractor, "html", HtmlExtractor, "Extract visible text from HTML");

    map_component!(registry, Tagger, "value", ValueTagger, "Insert a constant or copied value");
    map_component!(registry, Tagger, "length", LengthTagger, "Character, word and line counts");
    map_component!(registry, Tagger, "ngrams", NgramsTagger, "Most frequent word n-grams");
    map_component!(registry, Tagger, "language", LanguageTagger, "Stopword-based language identification");

    filter_component!(registry, "value", ValueFilter, "Compare a field against a value");
    filter_component!(registry, "exists", ExistsFilter, "Keep records where a field is present");
    filter_component!(registry, "language", LanguageFilter, "Keep records in allowed languages");
    filter_component!(registry, "length", LengthFilter, "Keep records within a length range");

    map_component!(registry, Formatter, "spacing", SpacingFormatter, "Repair whitespace and hyphenation");
    map_component!(registry, Formatter, "pii", PiiFormatter, "Replace email and IP addresses");

    registry.register_reader(
        "jsonl",
        "JSON lines file or directory",
        JsonlReader::param_schema(),
        |params| Ok(Arc::new(JsonlReader::from_params(params)?) as Arc<dyn Reader>),
    )?;
    registry.register_reader(
        "csv",
        "CSV file or directory, one record per row",
        CsvReader::param_schema(),
        |params| Ok(Arc::new(CsvReader::from_params(params)?) as Arc<dyn Reader>),
    )?;
    registry.register_reader(
        "text",
        "Plain text file, one record per line",
        TextReader::param_schema(),
        |params| Ok(Arc::new(TextReader::from_params(params)?) as Arc<dyn Reader>),
    )?;
    registry.register_writer(
        "jsonl",
        "JSON lines file, committed by rename",
        JsonlWriter::param_schema(),
        |params| Ok(Arc::new(JsonlWriter::from_params(params)?) as Arc<dyn Writer>),
    )?;
    registry.register_writer(
        "csv",
        "CSV file with a header row, committed by rename",
        CsvWriter::param_schema(),
        |params| Ok(Arc::new(CsvWriter::from_params(params)?) as Arc<dyn Writer>),
    )?;
    registry.register_writer(
        "null",
        "Discard all output",
        NullWriter::param_schema(),
        |params| Ok(Arc::new(NullWriter::from_params(params)?) as Arc<dyn Writer>),
    )?;

    register_aggregations(registry)?;
    log::debug!("Registered {} built-in components", registry.len());
    Ok(())
}

/// A fresh registry holding the built-ins.
pub fn builtin_registry() -> StrataResult<Registry> {
    let mut registry = Registry::new();
    register_builtins(&mut registry)?;
    Ok(registry)
}

/// Process-wide registry with the built-ins, created on first use.
///
/// Callers that add plugins should build their own with [`builtin_registry`]
/// and pass it to the compiler explicitly.
pub fn default_registry() -> &'static Registry {
    static DEFAULT: OnceLock<Registry> = OnceLock::new();
    DEFAULT.get_or_init(|| {
        builtin_registry().unwrap_or_else(|e| {
            log::error!("Failed to register built-in components: {e}");
            Registry::new()
        })
    })
}
