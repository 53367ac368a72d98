//! toolscout - semantic tool discovery and invocation.
//!
//! Tools are registered in-process, indexed as embeddings in SQLite, found by
//! cosine similarity to a natural-language query, and executed by name.

pub mod cli;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod handlers;
pub mod indexing;
pub mod persistence;
pub mod protocol;
pub mod state;
pub mod tools;

pub use config::Config;
pub use embeddings::{provider_from_config, EmbeddingError, EmbeddingProvider};
pub use error::{AppError, Result};
pub use handlers::router;
pub use indexing::{index_catalog, index_status, IndexReport, IndexStatus};
pub use persistence::{StoreError, ToolIndexStore};
pub use protocol::{DiscoveryService, ExecuteOutcome, SearchOutcome};
pub use state::AppState;
pub use tools::{ToolDefinition, ToolRegistry};
