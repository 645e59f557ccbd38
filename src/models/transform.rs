use serde::{Deserialize, Serialize};

use super::InvocationDescriptor;

/// One requested sort item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

/// Page in 1-based page number form
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageSpec {
    pub page_no: u64,
    pub page_size: u64,
}

#[derive(Debug, Deserialize)]
pub struct TransformRequest {
    pub sql: String,
    /// Target datasource id; when absent `invocation` is routed to pick one
    #[serde(default)]
    pub datasource: Option<String>,
    #[serde(default)]
    pub invocation: Option<InvocationDescriptor>,
    #[serde(default)]
    pub order_by: Vec<SortSpec>,
    #[serde(default)]
    pub page: Option<PageSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransformResponse {
    pub datasource: String,
    pub dialect: String,
    pub original_sql: String,
    pub sql: String,
    pub changed: bool,
}
