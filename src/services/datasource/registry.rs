use std::collections::HashMap;

use super::NamedDataSource;
use crate::api::middleware::AppError;
use crate::models::{DataSourceKey, DataSourceRole};

/// Members of one group, split by role
#[derive(Debug, Default)]
struct GroupMembers {
    primary: Option<DataSourceKey>,
    replicas: Vec<DataSourceKey>,
    all: Vec<DataSourceKey>,
}

/// Registry of named datasources.
///
/// Populated during startup through `register`, then shared read-only (behind an `Arc`)
/// by the selector and the engine. There is no unregistration.
#[derive(Debug, Default)]
pub struct DataSourceRegistry {
    datasources: HashMap<String, NamedDataSource>,
    groups: HashMap<String, GroupMembers>,
    order: Vec<String>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a datasource exactly once.
    ///
    /// Fails on a duplicate id or on a second primary inside the same group.
    pub fn register(&mut self, datasource: NamedDataSource) -> Result<(), AppError> {
        let key = datasource.key().clone();
        if self.datasources.contains_key(key.id()) {
            return Err(AppError::Configuration(format!(
                "datasource {} is already registered",
                key.id()
            )));
        }

        let members = self.groups.entry(key.group().to_string()).or_default();
        match key.role() {
            DataSourceRole::Primary => {
                if let Some(existing) = &members.primary {
                    return Err(AppError::Configuration(format!(
                        "group {} already has primary {}, cannot add {}",
                        key.group(),
                        existing.id(),
                        key.id()
                    )));
                }
                members.primary = Some(key.clone());
            }
            DataSourceRole::Replica => members.replicas.push(key.clone()),
        }
        members.all.push(key.clone());

        tracing::info!(
            "Registered datasource {} (role: {}, dialect: {})",
            key,
            key.role().as_str(),
            datasource.dialect()
        );

        self.order.push(key.id().to_string());
        self.datasources.insert(key.id().to_string(), datasource);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&NamedDataSource> {
        self.datasources.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.datasources.contains_key(id)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn len(&self) -> usize {
        self.datasources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasources.is_empty()
    }

    /// Datasources in registration order
    pub fn iter(&self) -> impl Iterator<Item = &NamedDataSource> {
        self.order.iter().filter_map(|id| self.datasources.get(id))
    }

    pub fn keys(&self) -> Vec<&DataSourceKey> {
        self.iter().map(|ds| ds.key()).collect()
    }

    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        groups.sort_unstable();
        groups
    }

    /// Every key of the group, in registration order
    pub fn group_keys(&self, group: &str) -> &[DataSourceKey] {
        self.groups
            .get(group)
            .map(|members| members.all.as_slice())
            .unwrap_or(&[])
    }

    pub fn primary_of(&self, group: &str) -> Option<&DataSourceKey> {
        self.groups.get(group).and_then(|members| members.primary.as_ref())
    }

    /// Keys eligible for load-balanced reads: the replicas, or the primary
    /// alone when the group has no replica
    pub fn read_candidates(&self, group: &str) -> &[DataSourceKey] {
        match self.groups.get(group) {
            Some(members) if !members.replicas.is_empty() => &members.replicas,
            Some(members) => members
                .primary
                .as_ref()
                .map(std::slice::from_ref)
                .unwrap_or(&[]),
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataSourceProperties;
    use crate::services::datasource::{DataSourcePool, DatabaseType, DialectInfo};

    fn datasource(name: &str, group: &str, role: DataSourceRole) -> NamedDataSource {
        NamedDataSource::new(
            DataSourceProperties::new(name, group, role, format!("postgresql://localhost/{}", name)),
            DialectInfo::new(DatabaseType::PostgreSQL, None),
            DataSourcePool::External,
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = DataSourceRegistry::new();
        registry.register(datasource("orders-primary", "orders", DataSourceRole::Primary)).unwrap();
        registry.register(datasource("orders-replica-1", "orders", DataSourceRole::Replica)).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("orders-primary"));
        assert!(registry.has_group("orders"));
        assert_eq!(registry.primary_of("orders").unwrap().id(), "orders-primary");
        assert_eq!(registry.group_keys("orders").len(), 2);
        assert_eq!(registry.groups(), vec!["orders"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = DataSourceRegistry::new();
        registry.register(datasource("a", "g", DataSourceRole::Replica)).unwrap();
        let result = registry.register(datasource("a", "g", DataSourceRole::Replica));
        assert!(matches!(result, Err(AppError::Configuration(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_second_primary_rejected() {
        let mut registry = DataSourceRegistry::new();
        registry.register(datasource("p1", "g", DataSourceRole::Primary)).unwrap();
        let result = registry.register(datasource("p2", "g", DataSourceRole::Primary));
        assert!(matches!(result, Err(AppError::Configuration(_))));
        assert!(!registry.contains("p2"));
    }

    #[test]
    fn test_read_candidates() {
        let mut registry = DataSourceRegistry::new();
        registry.register(datasource("solo", "reports", DataSourceRole::Primary)).unwrap();
        registry.register(datasource("p", "orders", DataSourceRole::Primary)).unwrap();
        registry.register(datasource("r1", "orders", DataSourceRole::Replica)).unwrap();
        registry.register(datasource("r2", "orders", DataSourceRole::Replica)).unwrap();

        let ids: Vec<&str> = registry.read_candidates("orders").iter().map(|k| k.id()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);

        let ids: Vec<&str> = registry.read_candidates("reports").iter().map(|k| k.id()).collect();
        assert_eq!(ids, vec!["solo"]);

        assert!(registry.read_candidates("missing").is_empty());
    }

    #[test]
    fn test_iter_keeps_registration_order() {
        let mut registry = DataSourceRegistry::new();
        for name in ["c", "a", "b"] {
            registry.register(datasource(name, "g", DataSourceRole::Replica)).unwrap();
        }
        let ids: Vec<&str> = registry.iter().map(|ds| ds.id()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
