use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{DataSourceRole, InvocationDescriptor};

#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub operation: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub declared_key: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl RouteRequest {
    pub fn into_invocation(self) -> InvocationDescriptor {
        InvocationDescriptor {
            operation: self.operation,
            group: self.group,
            declared_key: self.declared_key,
            attributes: self.attributes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteResponse {
    pub key: String,
    pub group: String,
    pub role: DataSourceRole,
    pub write: bool,
}
