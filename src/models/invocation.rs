use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-call description of a data-access invocation.
///
/// Built by the calling layer for every call and dropped once the call completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvocationDescriptor {
    /// Operation identity, e.g. `OrderRepository::insertOrder` or just `insertOrder`
    pub operation: String,
    /// Group hint declared or inferred by the caller
    #[serde(default)]
    pub group: Option<String>,
    /// Explicit datasource key id declared on the invocation target
    #[serde(default)]
    pub declared_key: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl InvocationDescriptor {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_declared_key(mut self, key: impl Into<String>) -> Self {
        self.declared_key = Some(key.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Method name without any `Type::` qualification
    pub fn method_name(&self) -> &str {
        self.operation
            .rsplit(|c| c == ':' || c == '.')
            .next()
            .unwrap_or(&self.operation)
    }
}
