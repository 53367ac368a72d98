//! `current_time`: the current UTC time.

use crate::tools::{
    ParameterProperty, ParameterSchema, RegistrationError, ToolDefinition, ToolError, ToolHandler,
    ToolOutput, ToolRegistry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "current_time";

#[derive(Debug, Default, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum TimeFormat {
    #[default]
    Rfc3339,
    Unix,
}

#[derive(Debug, Default, Deserialize)]
struct ClockInput {
    #[serde(default)]
    format: TimeFormat,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        NAME,
        "Get the current date and time in UTC, as an RFC 3339 timestamp or Unix seconds",
    )
    .with_parameters(
        ParameterSchema::new().property(
            "format",
            ParameterProperty::new("string", "Output format of the timestamp")
                .with_enum(["rfc3339", "unix"])
                .with_default("rfc3339"),
        ),
    )
}

pub fn register(registry: &ToolRegistry) -> Result<(), RegistrationError> {
    registry.register(definition(), Arc::new(ClockTool))
}

pub struct ClockTool;

impl ClockTool {
    fn render(now: DateTime<Utc>, format: TimeFormat) -> Value {
        match format {
            TimeFormat::Rfc3339 => json!({ "now": now.to_rfc3339(), "format": "rfc3339" }),
            TimeFormat::Unix => json!({ "now": now.timestamp(), "format": "unix" }),
        }
    }
}

#[async_trait]
impl ToolHandler for ClockTool {
    async fn call(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        // Tools without required parameters accept null or an empty body.
        let input: ClockInput = if arguments.is_null() {
            ClockInput::default()
        } else {
            serde_json::from_value(arguments).map_err(ToolError::invalid_arguments)?
        };

        Ok(ToolOutput(Self::render(Utc::now(), input.format)))
    }
}
