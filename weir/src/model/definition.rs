//! The pipeline definition: a parsed, format-agnostic document naming the
//! ordered steps of a pipeline and their configuration.

use crate::engine::{Flow, Operator};
use crate::errors::{DefinitionError, WeirError};
use crate::providers::SecretStore;
use crate::registry::{self, VersionSpec};
use crate::vars::{resolve_value, Variables};
use crate::Config;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single step in a pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique name of the step within the pipeline.
    pub name: String,
    /// Implementation reference: `internal/<kind>@<version>`.
    pub uses: String,
    /// Step-specific configuration.
    #[serde(default)]
    pub config: Config,
}

/// A parsed pipeline definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline name.
    #[serde(default)]
    pub name: Option<String>,
    /// Human description.
    #[serde(default)]
    pub description: Option<String>,
    /// Owning tenant.
    #[serde(default)]
    pub tenant: Option<String>,
    /// Data classification label.
    #[serde(default)]
    pub classification: Option<String>,
    /// Access model label.
    #[serde(default)]
    pub access_model: Option<String>,
    /// What triggers the pipeline.
    #[serde(default)]
    pub trigger: Option<Value>,
    /// Declared schema of the processed records.
    #[serde(default)]
    pub schema: Vec<Value>,
    /// Ordered list of steps to execute.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

/// A parsed `uses` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsesRef {
    /// The step kind name.
    pub kind: String,
    /// The requested version.
    pub version: VersionSpec,
}

impl UsesRef {
    /// Parses `internal/<kind>@<version>`.
    ///
    /// # Errors
    ///
    /// Wrong module prefixes and missing `@version` suffixes fail here, at
    /// definition parse time, before any registry lookup.
    pub fn parse(step_name: &str, uses: &str) -> Result<Self, WeirError> {
        let Some((module, reference)) = uses.split_once('/') else {
            return Err(DefinitionError::MalformedUses {
                step: step_name.to_string(),
                uses: uses.to_string(),
            }
            .into());
        };
        if module != "internal" {
            return Err(DefinitionError::InvalidModule {
                module: module.to_string(),
            }
            .into());
        }
        let Some((kind, version)) = reference.split_once('@') else {
            return Err(DefinitionError::MissingVersion {
                step: step_name.to_string(),
                uses: uses.to_string(),
            }
            .into());
        };
        Ok(Self {
            kind: kind.to_string(),
            version: version.parse()?,
        })
    }
}

impl PipelineDefinition {
    /// Parses a definition from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] when the document does not deserialize.
    pub fn from_json(document: &str) -> Result<Self, WeirError> {
        serde_json::from_str(document)
            .map_err(|err| DefinitionError::Parse(err.to_string()).into())
    }

    /// The pipeline's static metadata, merged into every step's config.
    #[must_use]
    pub fn flow_config(&self) -> Config {
        let mut config = Config::new();
        let pairs: [(&str, Option<Value>); 6] = [
            ("name", self.name.clone().map(Value::String)),
            ("description", self.description.clone().map(Value::String)),
            ("tenant", self.tenant.clone().map(Value::String)),
            (
                "classification",
                self.classification.clone().map(Value::String),
            ),
            ("access_model", self.access_model.clone().map(Value::String)),
            ("trigger", self.trigger.clone()),
        ];
        for (key, value) in pairs {
            config.insert(key.to_string(), value.unwrap_or(Value::Null));
        }
        config.insert("schema".to_string(), Value::Array(self.schema.clone()));
        config
    }

    /// Resolves `{{namespace.key}}` placeholders in every step's config,
    /// then merges the pipeline metadata into each step.
    ///
    /// # Errors
    ///
    /// Returns a [`VariableError`](crate::errors::VariableError) when a
    /// referenced namespace, key or secret is absent.
    pub fn resolve_variables(
        &mut self,
        variables: &Variables,
        secrets: &dyn SecretStore,
    ) -> Result<(), WeirError> {
        let flow_config = self.flow_config();
        for step in &mut self.steps {
            let resolved = resolve_value(&Value::Object(step.config.clone()), variables, secrets)?;
            let Value::Object(mut config) = resolved else {
                // resolve_value preserves the shape of its input
                unreachable!("object config resolved to non-object");
            };
            for (key, value) in &flow_config {
                config.insert(key.clone(), value.clone());
            }
            step.config = config;
        }
        Ok(())
    }

    /// Assembles the executable flow: one operator per step, linked as a
    /// linear chain in definition order, with the terminal `end` node
    /// appended.
    ///
    /// # Errors
    ///
    /// Surfaces `uses` parse errors, registry resolution failures, and
    /// step construction failures (missing config, failed screening).
    pub fn build_flow(&self) -> Result<Flow, WeirError> {
        let flow_config = self.flow_config();
        let mut flow = Flow::new();
        let mut previous: Option<&str> = None;

        for step in &self.steps {
            let uses = UsesRef::parse(&step.name, &step.uses)?;
            let descriptor = registry::resolve(&uses.kind, &uses.version)?;
            let transform =
                registry::instantiate(&descriptor, step.config.clone(), flow_config.clone())?;
            let operator = Operator::new(descriptor, transform, &step.config);

            flow.add_node(step.name.as_str(), operator)?;
            if let Some(previous) = previous {
                flow.add_edge(previous, step.name.as_str())?;
            }
            previous = Some(&step.name);
        }

        let end_descriptor = registry::resolve("end", &VersionSpec::Latest)?;
        let end_transform =
            registry::instantiate(&end_descriptor, Config::new(), flow_config)?;
        flow.add_node("end", Operator::new(end_descriptor, end_transform, &Config::new()))?;
        if let Some(previous) = previous {
            flow.add_edge(previous, "end")?;
        }

        Ok(flow)
    }
}
