//! Tools shipped with the service.
//!
//! Each tool module exposes a `register` function; `register_all` calls them
//! in a fixed order during start-up.

pub mod clock;
pub mod holidays;

use super::{RegistrationError, ToolRegistry};

/// Register every built-in tool.
pub fn register_all(registry: &ToolRegistry) -> Result<(), RegistrationError> {
    holidays::register(registry)?;
    clock::register(registry)?;

    tracing::info!(tools = registry.len(), "Built-in tools registered");
    Ok(())
}
