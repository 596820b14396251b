//! Declared argument schemas for registered tools.
//!
//! Validation reports every violated field, not just the first, so the
//! reasoning engine can fix a malformed call in one correction.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    Array,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

/// Field name → type/constraint table declared by each tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgumentSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl ArgumentSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chainable field declaration, used by tool implementations at
    /// registration time.
    pub fn field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        required: bool,
        description: impl Into<String>,
    ) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind,
                required,
                description: description.into(),
            },
        );
        self
    }

    pub fn required(self, name: impl Into<String>, kind: FieldKind, description: impl Into<String>) -> Self {
        self.field(name, kind, true, description)
    }

    pub fn optional(self, name: impl Into<String>, kind: FieldKind, description: impl Into<String>) -> Self {
        self.field(name, kind, false, description)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldSpec> {
        &self.fields
    }

    /// Validate an argument map. `Err` carries one entry per violation:
    /// missing required fields, type mismatches, and unknown fields.
    pub fn validate(&self, arguments: &Value) -> Result<(), Vec<String>> {
        let Some(map) = arguments.as_object() else {
            return Err(vec!["arguments: expected a JSON object".to_string()]);
        };

        let mut violations = Vec::new();

        for (name, spec) in &self.fields {
            if spec.required && !map.contains_key(name) {
                violations.push(format!("{name}: missing required field"));
            }
        }

        for (name, value) in map {
            match self.fields.get(name) {
                None => violations.push(format!("{name}: unknown field")),
                Some(spec) => {
                    if !value.is_null() && !spec.kind.matches(value) {
                        violations.push(format!("{name}: expected {}", spec.kind));
                    }
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
