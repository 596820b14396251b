//! Tool capability table and dispatch.
//!
//! - `schema` — declared argument schemas and validation
//! - `registry` — the `Tool` trait and name → capability table
//! - `invoke` — the invocation adapter: lookup → validate → rate limit →
//!   retry-wrapped execution → normalized `ToolResult`

pub mod invoke;
pub mod registry;
pub mod schema;

pub use invoke::{InvocationAdapter, ToolOutcome, ToolResult};
pub use registry::{Tool, ToolDescriptor, ToolRegistry};
pub use schema::{ArgumentSchema, FieldKind, FieldSpec};
