//! Renders a tool definition into the text that gets embedded.
//!
//! Indexing and nothing else goes through here, so the stored description
//! and the embedded text are always the same string.

use super::ToolDefinition;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DescribeError {
    #[error("failed to serialize parameters for tool {tool:?}: {source}")]
    Schema {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Embeddable rendering of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescription {
    /// Exact text passed to the embedding provider.
    pub text: String,
    /// Serialized parameter schema, if the tool takes parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<String>,
}

/// Build the description of a tool. Deterministic and free of I/O.
pub fn describe(definition: &ToolDefinition) -> Result<ToolDescription, DescribeError> {
    let text = format!(
        "Tool: {}\nDescription: {}",
        definition.name, definition.description
    );

    let input_schema = definition
        .parameters
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|source| DescribeError::Schema {
            tool: definition.name.clone(),
            source,
        })?;

    Ok(ToolDescription { text, input_schema })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ParameterProperty, ParameterSchema};
    use serde_json::{json, Value};

    #[test]
    fn test_text_format() {
        let def = ToolDefinition::new("get_holidays", "Retrieve public holidays");
        let description = describe(&def).unwrap();

        assert_eq!(
            description.text,
            "Tool: get_holidays\nDescription: Retrieve public holidays"
        );
        assert!(description.input_schema.is_none());
    }

    #[test]
    fn test_schema_is_serialized() {
        let def = ToolDefinition::new("get_holidays", "Retrieve public holidays").with_parameters(
            ParameterSchema::new()
                .required_property("year", ParameterProperty::new("string", "Target year")),
        );

        let description = describe(&def).unwrap();
        let schema: Value = serde_json::from_str(description.input_schema.as_deref().unwrap()).unwrap();
        assert_eq!(
            schema,
            json!({
                "properties": { "year": { "type": "string", "description": "Target year" } },
                "required": ["year"]
            })
        );
    }

    #[test]
    fn test_deterministic() {
        let def = ToolDefinition::new("current_time", "Tell the time").with_parameters(
            ParameterSchema::new()
                .property("format", ParameterProperty::new("string", "Output format"))
                .property("zone", ParameterProperty::new("string", "Zone")),
        );
        assert_eq!(describe(&def).unwrap(), describe(&def).unwrap());
    }
}
