//! Cross-stack exports.
//!
//! Stacks never look up each other's values by string at build time: a stack
//! builder receives its predecessors' typed outputs, which carry [`ExportRef`]s.
//! The [`ExportRegistry`] records what every composed stack exported and checks
//! each import a stack emits against it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::intrinsics;
use crate::error::{Error, Result};

/// A value exported by a composed stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportRef {
    /// Stack that exports the value
    pub stack_id: String,
    /// Global export name
    pub export_name: String,
}

impl ExportRef {
    pub fn new(stack_id: impl Into<String>, export_name: impl Into<String>) -> Self {
        Self {
            stack_id: stack_id.into(),
            export_name: export_name.into(),
        }
    }

    /// The value as seen from another stack.
    pub fn import_value(&self) -> Value {
        intrinsics::import_value(&self.export_name)
    }
}

/// Every export registered during a composition pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportRegistry {
    /// Export name -> exporting stack id
    exports: IndexMap<String, String>,
}

impl ExportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an export. Export names are global: a second stack may not reuse one.
    pub fn register(&mut self, stack_id: &str, export_name: &str) -> Result<()> {
        if let Some(first) = self.exports.get(export_name) {
            return Err(Error::DuplicateExport {
                export: export_name.to_string(),
                first: first.clone(),
                second: stack_id.to_string(),
            });
        }
        self.exports
            .insert(export_name.to_string(), stack_id.to_string());
        Ok(())
    }

    /// Resolve an import made by `importing_stack`, returning the exporting stack id.
    pub fn resolve(&self, importing_stack: &str, export_name: &str) -> Result<&str> {
        self.exports
            .get(export_name)
            .map(String::as_str)
            .ok_or_else(|| Error::unresolved(importing_stack, export_name))
    }

    pub fn contains(&self, export_name: &str) -> bool {
        self.exports.contains_key(export_name)
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }

    /// (export name, exporting stack) pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.exports.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Collect every `Fn::ImportValue` name found in a template value.
pub fn collect_imports(value: &Value, names: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(name)) = map.get("Fn::ImportValue") {
                names.push(name.clone());
            }
            for v in map.values() {
                collect_imports(v, names);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_imports(v, names);
            }
        }
        _ => {}
    }
}
