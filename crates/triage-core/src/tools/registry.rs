//! Tool registry: an explicit capability table mapping a name to an
//! invocable tool plus its declared schema and idempotency flag.
//!
//! Registration happens once during process startup; after that the
//! registry is shared read-only (`Arc<ToolRegistry>`). The write phase is
//! enforced by `&mut self` on `register` rather than by locking — callers
//! must not register tools mid-session, by contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::tools::schema::ArgumentSchema;

/// Contract every external tool implements. The core does not define what
/// a tool does internally — only this shape.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Declared argument schema, validated before dispatch.
    fn schema(&self) -> ArgumentSchema;

    /// Whether the tool is safe to re-invoke on a transient failure.
    /// Defaults to false: remediation actions must opt in explicitly.
    fn idempotent(&self) -> bool {
        false
    }

    /// Rate-limit bucket key. Defaults to the tool name; tools exposing
    /// sub-operations may return a finer-grained key.
    fn endpoint_key(&self) -> String {
        self.name().to_string()
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, CoreError>;
}

/// Listing entry returned by `ToolRegistry::list`, e.g. for building the
/// tool palette the reasoning engine sees.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: ArgumentSchema,
    pub idempotent: bool,
}

/// Name → capability table. O(1) lookup, safe for concurrent reads.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Startup-phase only; a later registration with the
    /// same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool re-registered, replacing earlier entry");
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> = self
            .tools
            .values()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                schema: t.schema(),
                idempotent: t.idempotent(),
            })
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
