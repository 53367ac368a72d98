//! Agent-facing protocol: `search_tools` and `execute_tool`.

pub mod service;
pub mod types;

pub use service::{DiscoveryService, SimilaritySearch};
pub use types::{
    ExecuteOutcome, ExecuteToolInput, SearchOutcome, SearchToolsInput, ToolSearchResult,
    DEFAULT_MAX_RESULTS, DEFAULT_MIN_RELEVANCE_SCORE,
};
