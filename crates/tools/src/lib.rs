pub mod args;
pub mod hr;
pub mod incident;
pub mod lookup;
pub mod registry;
pub mod validate;
pub mod wiki;

use opsdesk_core::{Store, StoreError};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    /// Validation failure that should stop the caller's workflow.
    #[error("Halt: {0}")]
    Halt(String),
    #[error("{0}")]
    InvalidArgs(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// A business rule refused the operation.
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ToolError {
    pub fn envelope(&self) -> Value {
        json!({ "success": false, "error": self.to_string() })
    }
}

pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value; // JSON Schema
    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError>;

    fn get_info(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters()
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Hr,
    Incident,
    Wiki,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Hr, Domain::Incident, Domain::Wiki];

    pub fn tools(self) -> Vec<Arc<dyn Tool>> {
        match self {
            Domain::Hr => hr::tools(),
            Domain::Incident => incident::tools(),
            Domain::Wiki => wiki::tools(),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Domain::Hr => "hr",
            Domain::Incident => "incident",
            Domain::Wiki => "wiki",
        };
        f.write_str(name)
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hr" => Ok(Domain::Hr),
            "incident" => Ok(Domain::Incident),
            "wiki" => Ok(Domain::Wiki),
            other => Err(format!("unknown domain '{other}' (expected hr, incident or wiki)")),
        }
    }
}

/// Registry with every tool of every domain registered.
pub fn default_registry() -> registry::ToolRegistry {
    let registry = registry::ToolRegistry::new();
    for domain in Domain::ALL {
        for tool in domain.tools() {
            registry.register(domain, tool);
        }
    }
    registry
}
