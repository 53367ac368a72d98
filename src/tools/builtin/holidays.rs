//! `get_holidays`: public holidays for a year and country, from Nager.Date.

use crate::tools::{
    ParameterProperty, ParameterSchema, RegistrationError, ToolDefinition, ToolError, ToolHandler,
    ToolOutput, ToolRegistry,
};
use async_trait::async_trait;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const NAME: &str = "get_holidays";

const DEFAULT_BASE_URL: &str = "https://date.nager.at/api/v3";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HolidaysInput {
    #[serde(default)]
    year: String,
    country_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Holiday {
    pub date: String,
    pub local_name: String,
    pub name: String,
    pub country_code: String,
    #[serde(default)]
    pub fixed: bool,
    #[serde(default)]
    pub global: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counties: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_year: Option<i32>,
    #[serde(default)]
    pub types: Vec<String>,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        NAME,
        "Retrieve the list of all public holidays for the specified year and country",
    )
    .with_parameters(
        ParameterSchema::new()
            .required_property(
                "year",
                ParameterProperty::new(
                    "string",
                    "The target year for which public holidays should be retrieved. If no specific year is asked, default to the current year",
                ),
            )
            .required_property(
                "countryCode",
                ParameterProperty::new("string", "A valid ISO 3166-1 alpha-2 country code."),
            ),
    )
}

pub fn register(registry: &ToolRegistry) -> Result<(), RegistrationError> {
    let tool = HolidaysTool::new(DEFAULT_BASE_URL).map_err(|e| RegistrationError::Handler {
        tool: NAME.to_string(),
        reason: e.to_string(),
    })?;
    registry.register(definition(), Arc::new(tool))
}

pub struct HolidaysTool {
    client: reqwest::Client,
    base_url: String,
}

impl HolidaysTool {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn fetch(&self, year: &str, country_code: &str) -> Result<Vec<Holiday>, ToolError> {
        let year = if year.trim().is_empty() {
            chrono::Utc::now().year().to_string()
        } else {
            year.trim().to_string()
        };

        let url = format!(
            "{}/PublicHolidays/{}/{}",
            self.base_url,
            year,
            country_code.trim().to_lowercase()
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::Upstream(format!("failed to fetch holidays: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Upstream(format!(
                "failed to fetch holidays: {}",
                status
            )));
        }

        response
            .json::<Vec<Holiday>>()
            .await
            .map_err(|e| ToolError::Upstream(format!("failed to decode holidays: {}", e)))
    }
}

#[async_trait]
impl ToolHandler for HolidaysTool {
    async fn call(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let input: HolidaysInput =
            serde_json::from_value(arguments).map_err(ToolError::invalid_arguments)?;

        let holidays = self.fetch(&input.year, &input.country_code).await?;
        tracing::debug!(
            year = %input.year,
            country = %input.country_code,
            count = holidays.len(),
            "Holidays fetched"
        );
        ToolOutput::json(&holidays)
    }
}
