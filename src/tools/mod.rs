//! Tool definitions, the registry that backs both the catalog and the
//! dispatch table, and the built-in tools.
//!
//! A tool is registered exactly once, as a definition paired with its handler.
//! The definition is what gets described and embedded for discovery; the
//! handler is what `execute_tool` calls.

pub mod builtin;
pub mod describe;
pub mod registry;

pub use describe::{describe, DescribeError, ToolDescription};
pub use registry::{RegistrationError, ToolRegistry};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single parameter accepted by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterProperty {
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ParameterProperty {
    pub fn new(param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            description: description.into(),
            allowed: None,
            default: None,
        }
    }

    /// Restrict the parameter to a fixed set of values.
    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Parameter schema of a tool. Property order is preserved so the serialized
/// schema is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub properties: IndexMap<String, ParameterProperty>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: impl Into<String>, property: ParameterProperty) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    /// Add a property and mark it required.
    pub fn required_property(mut self, name: impl Into<String>, property: ParameterProperty) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.properties.insert(name, property);
        self
    }

    /// Every required name must be a defined property.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        for key in &self.required {
            if !self.properties.contains_key(key) {
                return Err(RegistrationError::UndefinedRequired {
                    parameter: key.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Static description of a callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParameterSchema>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: ParameterSchema) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Check the definition invariants. Called by the registry before the
    /// definition becomes visible.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if !is_identifier(&self.name) {
            return Err(RegistrationError::InvalidName(self.name.clone()));
        }
        if self.description.trim().is_empty() {
            return Err(RegistrationError::EmptyDescription(self.name.clone()));
        }
        if let Some(parameters) = &self.parameters {
            parameters.validate().map_err(|e| match e {
                RegistrationError::UndefinedRequired { parameter } => {
                    RegistrationError::InvalidSchema {
                        tool: self.name.clone(),
                        parameter,
                    }
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Value produced by a tool handler. Any JSON shape is legal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ToolOutput(pub Value);

impl ToolOutput {
    /// Serialize any handler result into an output value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ToolError> {
        serde_json::to_value(value)
            .map(Self)
            .map_err(|e| ToolError::Failed(format!("failed to serialize result: {}", e)))
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to parse arguments: {0}")]
    InvalidArguments(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    /// Wrap a serde error from argument decoding.
    pub fn invalid_arguments(err: serde_json::Error) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}

/// Executable side of a registered tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with the caller's arguments, passed through unmodified.
    async fn call(&self, arguments: Value) -> Result<ToolOutput, ToolError>;
}
