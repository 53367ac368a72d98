//! Discovery and invocation: the two operations an agent calls.
//!
//! Every failure becomes an outcome value. Nothing here returns an `Err` to
//! the transport, so one bad request never affects another.

use super::types::{
    ExecuteOutcome, ExecuteToolInput, SearchOutcome, SearchToolsInput, ToolSearchResult,
};
use crate::embeddings::EmbeddingProvider;
use crate::persistence::{StoreError, ToolIndexStore, ToolWithScore};
use crate::tools::ToolRegistry;
use async_trait::async_trait;
use serde_json::value::RawValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::Instrument;
use uuid::Uuid;

/// Nearest-neighbour lookup over indexed tools.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn find_similar(
        &self,
        query: Vec<f32>,
        min_score: f64,
        limit: usize,
        deadline: Option<std::time::Instant>,
    ) -> Result<Vec<ToolWithScore>, StoreError>;
}

#[async_trait]
impl SimilaritySearch for ToolIndexStore {
    async fn find_similar(
        &self,
        query: Vec<f32>,
        min_score: f64,
        limit: usize,
        deadline: Option<std::time::Instant>,
    ) -> Result<Vec<ToolWithScore>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.find_similar_with_score(&query, min_score, limit, deadline)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

pub struct DiscoveryService {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SimilaritySearch>,
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl DiscoveryService {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn SimilaritySearch>,
        registry: Arc<ToolRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            registry,
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Search with the configured request timeout.
    pub async fn search(&self, input: SearchToolsInput) -> SearchOutcome {
        self.search_until(input, Instant::now() + self.timeout).await
    }

    /// Embed the query and return the live tools scoring at least
    /// `min_relevance_score`, best first.
    pub async fn search_until(&self, input: SearchToolsInput, deadline: Instant) -> SearchOutcome {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "search_tools",
            %request_id,
            query = %input.query,
            max_results = input.max_results,
            min_relevance_score = input.min_relevance_score,
        );

        async move {
            let start = std::time::Instant::now();
            metrics::counter!("search_tools_requests_total").increment(1);

            let outcome = self.run_search(&input, deadline).await;

            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            metrics::histogram!("search_tools_latency_ms").record(latency_ms);
            if let SearchOutcome::Found { tools, .. } = &outcome {
                metrics::histogram!("search_tools_results").record(tools.len() as f64);
            }

            tracing::info!(status = outcome.status(), latency_ms, "Search complete");
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_search(&self, input: &SearchToolsInput, deadline: Instant) -> SearchOutcome {
        if let Err(reason) = input.validate() {
            tracing::warn!(error = %reason, "Rejected search input");
            return SearchOutcome::error(reason);
        }

        let vector = match timeout_at(deadline, self.embedder.embed(&input.query)).await {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => {
                tracing::error!(error = %e, retryable = e.is_retryable(), "Query embedding failed");
                return SearchOutcome::error(format!("Failed to generate embedding: {}", e));
            }
            Err(_) => {
                tracing::warn!("Deadline passed while embedding query");
                return SearchOutcome::error("Failed to generate embedding: deadline exceeded");
            }
        };

        let limit = usize::try_from(input.max_results).unwrap_or(usize::MAX);
        let lookup = self.index.find_similar(
            vector,
            input.min_relevance_score,
            limit,
            Some(deadline.into_std()),
        );

        let rows = match timeout_at(deadline, lookup).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(StoreError::DeadlineExceeded)) | Err(_) => {
                tracing::warn!("Deadline passed while searching the index");
                return SearchOutcome::error("Database search failed: deadline exceeded");
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Index search failed");
                return SearchOutcome::error(format!("Database search failed: {}", e));
            }
        };

        if rows.is_empty() {
            return SearchOutcome::no_matches(&input.query, input.min_relevance_score);
        }

        SearchOutcome::Found {
            tools: rows.into_iter().map(project).collect(),
            query: input.query.clone(),
        }
    }

    /// Execute with the configured request timeout.
    pub async fn execute(&self, input: ExecuteToolInput) -> ExecuteOutcome {
        self.execute_until(input, Instant::now() + self.timeout).await
    }

    /// Look the tool up and call its handler with the arguments untouched.
    pub async fn execute_until(&self, input: ExecuteToolInput, deadline: Instant) -> ExecuteOutcome {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("execute_tool", %request_id, tool = %input.tool_name);

        async move {
            metrics::counter!("execute_tool_requests_total").increment(1);

            let Some(handler) = self.registry.lookup(&input.tool_name) else {
                tracing::warn!("Unknown tool requested");
                metrics::counter!("execute_tool_failures_total").increment(1);
                return ExecuteOutcome::error(format!("Tool not found: {}", input.tool_name));
            };

            let outcome = match timeout_at(deadline, handler.call(input.arguments)).await {
                Ok(Ok(output)) => ExecuteOutcome::Completed {
                    result: output.into_value(),
                },
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Tool execution failed");
                    ExecuteOutcome::error(format!("Tool execution failed: {}", e))
                }
                Err(_) => {
                    tracing::warn!("Deadline passed during tool execution");
                    ExecuteOutcome::error("Tool execution failed: deadline exceeded")
                }
            };

            if matches!(outcome, ExecuteOutcome::Error { .. }) {
                metrics::counter!("execute_tool_failures_total").increment(1);
            }
            tracing::info!(status = outcome.status(), "Execution complete");
            outcome
        }
        .instrument(span)
        .await
    }
}

fn project(row: ToolWithScore) -> ToolSearchResult {
    let parameters = row.input_schema.and_then(|schema| {
        RawValue::from_string(schema)
            .map_err(|e| {
                tracing::warn!(tool = %row.name, error = %e, "Stored parameter schema is not valid JSON");
            })
            .ok()
    });

    ToolSearchResult {
        name: row.name,
        description: row.description,
        parameters,
        relevance_score: row.relevance_score,
    }
}
