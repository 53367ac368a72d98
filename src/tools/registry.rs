//! Process-wide tool registry.
//!
//! Serves as both the catalog (definitions, in registration order) and the
//! dispatch table (name → handler). Both are written by a single
//! `register` call so a definition can never exist without its handler.

use super::{ToolDefinition, ToolHandler};
use indexmap::IndexMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("tool name {0:?} is not a valid identifier")]
    InvalidName(String),

    #[error("tool {0:?} has an empty description")]
    EmptyDescription(String),

    #[error("required key {parameter:?} not found in properties")]
    UndefinedRequired { parameter: String },

    #[error("invalid tool registration: {tool} - required key {parameter:?} not found in properties")]
    InvalidSchema { tool: String, parameter: String },

    #[error("tool {0:?} is already registered")]
    Duplicate(String),

    #[error("failed to build handler for tool {tool:?}: {reason}")]
    Handler { tool: String, reason: String },
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Catalog and dispatch table for all tools known to this process.
///
/// Built during start-up and shared behind an `Arc`; reads take a shared lock
/// only, so many requests can look up handlers at once.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<IndexMap<String, RegisteredTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool definition together with its handler.
    ///
    /// An invalid definition is a programming error in the tool itself;
    /// callers propagate the error so the process never starts with it.
    pub fn register(
        &self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistrationError> {
        definition.validate()?;

        let mut tools = self.tools.write().unwrap_or_else(|e| e.into_inner());
        if tools.contains_key(&definition.name) {
            return Err(RegistrationError::Duplicate(definition.name));
        }

        tracing::debug!(tool = %definition.name, "Tool registered");
        tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                handler,
            },
        );
        Ok(())
    }

    /// All definitions in registration order.
    pub fn all_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|t| t.definition.clone())
            .collect()
    }

    /// Resolve a tool name to its handler.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|t| Arc::clone(&t.handler))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
