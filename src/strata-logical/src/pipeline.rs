//! Declarative pipeline descriptions.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use common_config::ExecutionConfig;
use common_error::{StrataError, StrataResult};
use strata_core::Value;

// ============================================================================
// Categories
// ============================================================================

/// Category of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentCategory {
    Reader,
    Writer,
    #[serde(alias = "extract")]
    Extractor,
    #[serde(alias = "tag")]
    Tagger,
    Filter,
    #[serde(alias = "format")]
    Formatter,
    #[serde(alias = "aggregate")]
    Aggregation,
}

impl ComponentCategory {
    /// Every category, in listing order.
    pub const ALL: [Self; 7] = [
        Self::Reader,
        Self::Writer,
        Self::Extractor,
        Self::Tagger,
        Self::Filter,
        Self::Formatter,
        Self::Aggregation,
    ];

    /// Canonical lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Writer => "writer",
            Self::Extractor => "extractor",
            Self::Tagger => "tagger",
            Self::Filter => "filter",
            Self::Formatter => "formatter",
            Self::Aggregation => "aggregation",
        }
    }

    /// Stage kind for stage categories, `None` for connectors.
    pub const fn stage_kind(&self) -> Option<StageKind> {
        match self {
            Self::Extractor | Self::Tagger | Self::Formatter => Some(StageKind::Map),
            Self::Filter => Some(StageKind::Filter),
            Self::Aggregation => Some(StageKind::Aggregate),
            Self::Reader | Self::Writer => None,
        }
    }

    /// Whether this is a reader or writer.
    pub const fn is_connector(&self) -> bool {
        self.stage_kind().is_none()
    }
}

impl std::fmt::Display for ComponentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComponentCategory {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reader" => Ok(Self::Reader),
            "writer" => Ok(Self::Writer),
            "extractor" | "extract" => Ok(Self::Extractor),
            "tagger" | "tag" => Ok(Self::Tagger),
            "filter" => Ok(Self::Filter),
            "formatter" | "format" => Ok(Self::Formatter),
            "aggregation" | "aggregate" => Ok(Self::Aggregation),
            other => Err(StrataError::config(format!(
                "unknown component category '{other}'"
            ))),
        }
    }
}

/// Capability a stage implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// One record in, zero or one record out.
    Map,
    /// Keep or drop.
    Filter,
    /// Accumulate and forward unchanged.
    Aggregate,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Map => write!(f, "Map"),
            Self::Filter => write!(f, "Filter"),
            Self::Aggregate => write!(f, "Aggregate"),
        }
    }
}

// ============================================================================
// Descriptors
// ============================================================================

fn default_enabled() -> bool {
    true
}

/// One stage of a pipeline description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentDescriptor {
    /// Component category.
    pub category: ComponentCategory,
    /// Registered component name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Raw parameters, validated at compile time.
    #[serde(default)]
    pub params: IndexMap<String, Value>,
    /// Stage name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Disabled stages are validated but not run.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ComponentDescriptor {
    /// Create an enabled descriptor without parameters.
    pub fn new(category: ComponentCategory, type_name: impl Into<String>) -> Self {
        Self {
            category,
            type_name: type_name.into(),
            params: IndexMap::new(),
            name: None,
            enabled: true,
        }
    }

    /// Set a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Set the stage name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable or disable the stage.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// `category.type`, used when no explicit name is given.
    pub fn qualified_type(&self) -> String {
        format!("{}.{}", self.category, self.type_name)
    }
}

/// Input or output connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectorConfig {
    /// Registered reader/writer name.
    pub format: String,
    /// Location of the data, passed to the connector as the `path` parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Extra connector parameters.
    #[serde(default)]
    pub params: IndexMap<String, Value>,
}

impl ConnectorConfig {
    /// Create a connector without a path.
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            path: None,
            params: IndexMap::new(),
        }
    }

    /// Set the path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Parameters with `path` merged in.
    pub fn resolved_params(&self) -> IndexMap<String, Value> {
        let mut params = self.params.clone();
        if let Some(path) = &self.path {
            params.insert("path".to_string(), Value::from(path.as_str()));
        }
        params
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// A declarative pipeline description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pipeline name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Input reader.
    pub input: ConnectorConfig,
    /// Ordered stages.
    #[serde(default)]
    pub processors: Vec<ComponentDescriptor>,
    /// Aggregations, appended after `processors`.
    #[serde(default)]
    pub aggregations: Vec<ComponentDescriptor>,
    /// Output writer. Without one, surviving records are discarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ConnectorConfig>,
    /// Run-level execution settings.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl PipelineConfig {
    /// Create a pipeline with an input and no stages.
    pub fn new(name: impl Into<String>, input: ConnectorConfig) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input,
            processors: Vec::new(),
            aggregations: Vec::new(),
            output: None,
            execution: ExecutionConfig::default(),
        }
    }

    /// Append a stage.
    #[must_use]
    pub fn with_stage(mut self, descriptor: ComponentDescriptor) -> Self {
        self.processors.push(descriptor);
        self
    }

    /// Append an aggregation.
    #[must_use]
    pub fn with_aggregation(mut self, descriptor: ComponentDescriptor) -> Self {
        self.aggregations.push(descriptor);
        self
    }

    /// Set the output connector.
    #[must_use]
    pub fn with_output(mut self, output: ConnectorConfig) -> Self {
        self.output = Some(output);
        self
    }

    /// Set the execution config.
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    /// Every stage descriptor in execution order.
    pub fn stages(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.processors.iter().chain(self.aggregations.iter())
    }

    /// Parse a YAML description.
    pub fn from_yaml_str(source: &str) -> StrataResult<Self> {
        serde_yaml::from_str(source)
            .map_err(|e| StrataError::config(format!("invalid pipeline description: {e}")))
    }

    /// Parse a JSON description.
    pub fn from_json_str(source: &str) -> StrataResult<Self> {
        serde_json::from_str(source)
            .map_err(|e| StrataError::config(format!("invalid pipeline description: {e}")))
    }

    /// Load a description from disk; `.json` files are parsed as JSON,
    /// everything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> StrataResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| StrataError::io(format!("cannot read {}: {e}", path.display())))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            Self::from_json_str(&source)
        } else {
            Self::from_yaml_str(&source)
        };
        parsed.map_err(|e| match e {
            StrataError::Config(msg) => StrataError::config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Serialize back to YAML.
    pub fn to_yaml_string(&self) -> StrataResult<String> {
        serde_yaml::to_string(self).map_err(|e| StrataError::config(e.to_string()))
    }
}
