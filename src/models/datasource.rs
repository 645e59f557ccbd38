use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Role a datasource plays inside its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceRole {
    /// The single authoritative endpoint writes are pinned to
    Primary,
    /// Read-only copy eligible for load-balanced reads
    Replica,
}

impl DataSourceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceRole::Primary => "primary",
            DataSourceRole::Replica => "replica",
        }
    }
}

impl Default for DataSourceRole {
    fn default() -> Self {
        DataSourceRole::Replica
    }
}

/// Identifier of one physical datasource endpoint.
///
/// Immutable once created: fields are private and only exposed through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DataSourceKey {
    group: String,
    id: String,
    role: DataSourceRole,
}

impl DataSourceKey {
    pub fn new(group: impl Into<String>, id: impl Into<String>, role: DataSourceRole) -> Self {
        Self {
            group: group.into(),
            id: id.into(),
            role,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> DataSourceRole {
        self.role
    }

    pub fn is_primary(&self) -> bool {
        self.role == DataSourceRole::Primary
    }
}

impl fmt::Display for DataSourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.id)
    }
}

/// Configured definition of one datasource, as read from configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceProperties {
    /// Unique key id, e.g. `orders-primary`
    pub name: String,
    pub group: String,
    #[serde(default)]
    pub role: DataSourceRole,
    pub url: String,
    #[serde(default = "default_database_type")]
    pub database_type: String,
    /// Major product version, used to pick dialect-specific rewrites
    #[serde(default)]
    pub database_version: Option<u32>,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    /// Driver properties passed through untouched
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl DataSourceProperties {
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        role: DataSourceRole,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            role,
            url: url.into(),
            database_type: default_database_type(),
            database_version: None,
            weight: default_weight(),
            max_pool_size: default_max_pool_size(),
            properties: HashMap::new(),
        }
    }

    pub fn with_database_type(mut self, database_type: impl Into<String>) -> Self {
        self.database_type = database_type.into();
        self
    }

    pub fn with_version(mut self, major_version: u32) -> Self {
        self.database_version = Some(major_version);
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn key(&self) -> DataSourceKey {
        DataSourceKey::new(self.group.clone(), self.name.clone(), self.role)
    }
}

fn default_database_type() -> String {
    "postgresql".to_string()
}

fn default_weight() -> u32 {
    1
}

fn default_max_pool_size() -> usize {
    16
}

/// Summary of a registered datasource, returned by the admin API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceSummary {
    pub id: String,
    pub group: String,
    pub role: DataSourceRole,
    pub database_type: String,
    pub database_version: Option<u32>,
    pub pooled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = DataSourceKey::new("orders", "orders-primary", DataSourceRole::Primary);
        assert_eq!(key.to_string(), "orders/orders-primary");
        assert!(key.is_primary());
    }

    #[test]
    fn test_properties_defaults_from_json() {
        let props: DataSourceProperties = serde_json::from_str(
            r#"{"name":"r1","group":"orders","url":"postgresql://localhost/orders"}"#,
        )
        .unwrap();
        assert_eq!(props.role, DataSourceRole::Replica);
        assert_eq!(props.database_type, "postgresql");
        assert_eq!(props.weight, 1);
        assert_eq!(props.max_pool_size, 16);
        assert!(props.database_version.is_none());
    }

    #[test]
    fn test_properties_key() {
        let props = DataSourceProperties::new(
            "orders-primary",
            "orders",
            DataSourceRole::Primary,
            "postgresql://localhost/orders",
        );
        let key = props.key();
        assert_eq!(key.id(), "orders-primary");
        assert_eq!(key.group(), "orders");
        assert_eq!(key.role(), DataSourceRole::Primary);
    }
}
