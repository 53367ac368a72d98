use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

pub const DEFAULT_MAX_RESULTS: i64 = 5;
pub const DEFAULT_MIN_RELEVANCE_SCORE: f64 = 0.7;

fn default_max_results() -> i64 {
    DEFAULT_MAX_RESULTS
}

fn default_min_relevance_score() -> f64 {
    DEFAULT_MIN_RELEVANCE_SCORE
}

/// Request body for `search_tools`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchToolsInput {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: i64,
    #[serde(default = "default_min_relevance_score")]
    pub min_relevance_score: f64,
}

impl SearchToolsInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: DEFAULT_MAX_RESULTS,
            min_relevance_score: DEFAULT_MIN_RELEVANCE_SCORE,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("Invalid arguments: query must not be empty".to_string());
        }
        if self.max_results < 1 {
            return Err(format!(
                "Invalid arguments: max_results must be at least 1, got {}",
                self.max_results
            ));
        }
        if !(-1.0..=1.0).contains(&self.min_relevance_score) {
            return Err(format!(
                "Invalid arguments: min_relevance_score must be between -1 and 1, got {}",
                self.min_relevance_score
            ));
        }
        Ok(())
    }
}

/// One discovered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSearchResult {
    pub name: String,
    pub description: String,
    /// Stored parameter schema, emitted exactly as it was indexed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Box<RawValue>>,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    Found {
        tools: Vec<ToolSearchResult>,
        query: String,
    },
    NoMatches {
        message: String,
    },
    Error {
        message: String,
    },
}

impl SearchOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn no_matches(query: &str, min_relevance_score: f64) -> Self {
        Self::NoMatches {
            message: format!(
                "No tools found matching: {:?} with minimum relevance score of {:.2}",
                query, min_relevance_score
            ),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Found { .. } => "found",
            Self::NoMatches { .. } => "no_matches",
            Self::Error { .. } => "error",
        }
    }
}

/// Request body for `execute_tool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteToolInput {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecuteOutcome {
    Completed { result: Value },
    Error { message: String },
}

impl ExecuteOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }
}
