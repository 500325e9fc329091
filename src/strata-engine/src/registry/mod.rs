//! Component registry.
//!
//! Maps `(category, name)` to a factory closure and the component's declared
//! parameter schema. Factories are pure constructors: they read validated
//! [`Params`] and build the component without touching data.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::json;

use common_error::{StrataError, StrataResult};
use strata_core::Value;
use strata_logical::{ComponentCategory, ParamSchema, Params, StageKind};
use strata_storage::{Reader, Writer};

use crate::stages::{AggregateFn, FilterFn, MapFn, Stage};

pub type MapFactory = Arc<dyn Fn(&Params) -> StrataResult<Arc<dyn MapFn>> + Send + Sync>;
pub type FilterFactory = Arc<dyn Fn(&Params) -> StrataResult<Arc<dyn FilterFn>> + Send + Sync>;
pub type AggregateFactory =
    Arc<dyn Fn(&Params) -> StrataResult<Arc<dyn AggregateFn>> + Send + Sync>;
pub type ReaderFactory = Arc<dyn Fn(&Params) -> StrataResult<Arc<dyn Reader>> + Send + Sync>;
pub type WriterFactory = Arc<dyn Fn(&Params) -> StrataResult<Arc<dyn Writer>> + Send + Sync>;

/// Constructor for one component, tagged by what it builds.
#[derive(Clone)]
pub enum Factory {
    Map(MapFactory),
    Filter(FilterFactory),
    Aggregate(AggregateFactory),
    Reader(ReaderFactory),
    Writer(WriterFactory),
}

impl Factory {
    fn label(&self) -> &'static str {
        match self {
            Self::Map(_) => "map",
            Self::Filter(_) => "filter",
            Self::Aggregate(_) => "aggregate",
            Self::Reader(_) => "reader",
            Self::Writer(_) => "writer",
        }
    }

    /// Whether this factory can build components of `category`.
    fn fits(&self, category: ComponentCategory) -> bool {
        match self {
            Self::Map(_) => category.stage_kind() == Some(StageKind::Map),
            Self::Filter(_) => category.stage_kind() == Some(StageKind::Filter),
            Self::Aggregate(_) => category.stage_kind() == Some(StageKind::Aggregate),
            Self::Reader(_) => category == ComponentCategory::Reader,
            Self::Writer(_) => category == ComponentCategory::Writer,
        }
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Factory::{}", self.label())
    }
}

/// One registered component.
#[derive(Debug, Clone)]
pub struct ComponentEntry {
    pub category: ComponentCategory,
    pub name: String,
    pub description: String,
    pub schema: ParamSchema,
    factory: Factory,
}

impl ComponentEntry {
    /// `category.name`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.category, self.name)
    }

    /// Validate raw parameters against the declared schema.
    pub fn validate(&self, raw: &IndexMap<String, Value>) -> StrataResult<Params> {
        self.schema.validate(&self.qualified_name(), raw)
    }

    /// Build a stage from validated parameters.
    pub fn build_stage(&self, params: &Params) -> StrataResult<Stage> {
        match &self.factory {
            Factory::Map(f) => f(params).map(Stage::Map),
            Factory::Filter(f) => f(params).map(Stage::Filter),
            Factory::Aggregate(f) => f(params).map(Stage::Aggregate),
            Factory::Reader(_) | Factory::Writer(_) => Err(StrataError::stage_order(
                self.qualified_name(),
                "readers and writers cannot be used as stages",
            )),
        }
    }

    /// Build a reader from validated parameters.
    pub fn build_reader(&self, params: &Params) -> StrataResult<Arc<dyn Reader>> {
        match &self.factory {
            Factory::Reader(f) => f(params),
            _ => Err(StrataError::stage_order(
                self.qualified_name(),
                "only reader components can be used as input",
            )),
        }
    }

    /// Build a writer from validated parameters.
    pub fn build_writer(&self, params: &Params) -> StrataResult<Arc<dyn Writer>> {
        match &self.factory {
            Factory::Writer(f) => f(params),
            _ => Err(StrataError::stage_order(
                self.qualified_name(),
                "only writer components can be used as output",
            )),
        }
    }

    /// JSON-Schema document for this component.
    pub fn json_schema(&self) -> serde_json::Value {
        self.schema.to_json_schema(
            &format!("strata://{}/{}", self.category, self.name),
            &self.qualified_name(),
            &self.description,
        )
    }
}

/// Table of components keyed by category and name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    components: BTreeMap<ComponentCategory, BTreeMap<String, ComponentEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component.
    ///
    /// Fails with `DuplicateComponentError` if the name is taken within the
    /// category, and with `ConfigError` if the factory cannot build
    /// components of that category.
    pub fn register(
        &mut self,
        category: ComponentCategory,
        name: impl Into<String>,
        description: impl Into<String>,
        factory: Factory,
        schema: ParamSchema,
    ) -> StrataResult<()> {
        let name = name.into();
        if !factory.fits(category) {
            return Err(StrataError::config(format!(
                "a {} factory cannot be registered as {category} '{name}'",
                factory.label()
            )));
        }
        let entries = self.components.entry(category).or_default();
        if entries.contains_key(&name) {
            return Err(StrataError::duplicate(category.as_str(), name));
        }
        log::debug!("registered {category}.{name}");
        entries.insert(
            name.clone(),
            ComponentEntry {
                category,
                name,
                description: description.into(),
                schema,
                factory,
            },
        );
        Ok(())
    }

    pub fn register_map<F>(
        &mut self,
        category: ComponentCategory,
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ParamSchema,
        factory: F,
    ) -> StrataResult<()>
    where
        F: Fn(&Params) -> StrataResult<Arc<dyn MapFn>> + Send + Sync + 'static,
    {
        self.register(category, name, description, Factory::Map(Arc::new(factory)), schema)
    }

    pub fn register_filter<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ParamSchema,
        factory: F,
    ) -> StrataResult<()>
    where
        F: Fn(&Params) -> StrataResult<Arc<dyn FilterFn>> + Send + Sync + 'static,
    {
        self.register(
            ComponentCategory::Filter,
            name,
            description,
            Factory::Filter(Arc::new(factory)),
            schema,
        )
    }

    pub fn register_aggregate<F>(
        &mut self,
        category: ComponentCategory,
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ParamSchema,
        factory: F,
    ) -> StrataResult<()>
    where
        F: Fn(&Params) -> StrataResult<Arc<dyn AggregateFn>> + Send + Sync + 'static,
    {
        self.register(
            category,
            name,
            description,
            Factory::Aggregate(Arc::new(factory)),
            schema,
        )
    }

    pub fn register_reader<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ParamSchema,
        factory: F,
    ) -> StrataResult<()>
    where
        F: Fn(&Params) -> StrataResult<Arc<dyn Reader>> + Send + Sync + 'static,
    {
        self.register(
            ComponentCategory::Reader,
            name,
            description,
            Factory::Reader(Arc::new(factory)),
            schema,
        )
    }

    pub fn register_writer<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ParamSchema,
        factory: F,
    ) -> StrataResult<()>
    where
        F: Fn(&Params) -> StrataResult<Arc<dyn Writer>> + Send + Sync + 'static,
    {
        self.register(
            ComponentCategory::Writer,
            name,
            description,
            Factory::Writer(Arc::new(factory)),
            schema,
        )
    }

    /// Look up a component, listing the alternatives when it is missing.
    pub fn resolve(&self, category: ComponentCategory, name: &str) -> StrataResult<&ComponentEntry> {
        self.components
            .get(&category)
            .and_then(|entries| entries.get(name))
            .ok_or_else(|| {
                let available: Vec<String> = self
                    .components
                    .get(&category)
                    .map(|entries| entries.keys().cloned().collect())
                    .unwrap_or_default();
                StrataError::not_found(category.as_str(), name, &available)
            })
    }

    pub fn contains(&self, category: ComponentCategory, name: &str) -> bool {
        self.components
            .get(&category)
            .is_some_and(|entries| entries.contains_key(name))
    }

    /// Registered names per category.
    pub fn list(&self) -> BTreeMap<ComponentCategory, BTreeSet<String>> {
        self.components
            .iter()
            .map(|(category, entries)| (*category, entries.keys().cloned().collect()))
            .collect()
    }

    /// All entries, optionally restricted to one category.
    pub fn entries(
        &self,
        category: Option<ComponentCategory>,
    ) -> impl Iterator<Item = &ComponentEntry> + '_ {
        self.components
            .iter()
            .filter(move |(c, _)| category.map_or(true, |wanted| **c == wanted))
            .flat_map(|(_, entries)| entries.values())
    }

    pub fn len(&self) -> usize {
        self.components.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// JSON-Schema documents for every component, keyed by `$id`.
    pub fn export_schemas(&self, category: Option<ComponentCategory>) -> serde_json::Value {
        let schemas: serde_json::Map<String, serde_json::Value> = self
            .entries(category)
            .map(|entry| {
                (
                    format!("strata://{}/{}", entry.category, entry.name),
                    entry.json_schema(),
                )
            })
            .collect();
        json!({ "components": schemas })
    }
}
