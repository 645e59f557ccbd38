use std::collections::HashMap;
use std::sync::Arc;

use super::{
    DataSourceKeyRouter, MethodDataSourceKeyRegistry, RandomRouter, RoundRobinRouter,
    WeightedRandomRouter, WriteOperationMatcher,
};
use crate::api::middleware::AppError;
use crate::models::{DataSourceKey, InvocationDescriptor};
use crate::services::datasource::DataSourceRegistry;

/// Group -> router and group -> write matcher allocations.
///
/// Only produced by `SelectorBuilder::build`, immutable afterwards.
pub struct RouterAllocationTable {
    routers: HashMap<String, Arc<dyn DataSourceKeyRouter>>,
    default_router: Option<String>,
    default_group: Option<String>,
    group_routers: HashMap<String, String>,
    write_matchers: HashMap<String, WriteOperationMatcher>,
}

impl RouterAllocationTable {
    /// Allocated router of the group, else the default router
    pub fn router_for(&self, group: &str) -> Option<&Arc<dyn DataSourceKeyRouter>> {
        self.group_routers
            .get(group)
            .or(self.default_router.as_ref())
            .and_then(|name| self.routers.get(name))
    }

    pub fn write_matcher(&self, group: &str) -> Option<&WriteOperationMatcher> {
        self.write_matchers.get(group)
    }

    pub fn default_router(&self) -> Option<&str> {
        self.default_router.as_deref()
    }

    pub fn default_group(&self) -> Option<&str> {
        self.default_group.as_deref()
    }

    pub fn router_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Collects routers and allocations during startup and validates them as a whole
pub struct SelectorBuilder {
    registry: Arc<DataSourceRegistry>,
    key_registry: MethodDataSourceKeyRegistry,
    routers: HashMap<String, Arc<dyn DataSourceKeyRouter>>,
    default_router: Option<String>,
    default_group: Option<String>,
    group_routers: HashMap<String, String>,
    write_matchers: HashMap<String, WriteOperationMatcher>,
}

impl SelectorBuilder {
    pub fn new(registry: Arc<DataSourceRegistry>) -> Self {
        Self {
            registry,
            key_registry: MethodDataSourceKeyRegistry::new(),
            routers: HashMap::new(),
            default_router: None,
            default_group: None,
            group_routers: HashMap::new(),
            write_matchers: HashMap::new(),
        }
    }

    pub fn key_registry(&mut self, key_registry: MethodDataSourceKeyRegistry) -> &mut Self {
        self.key_registry = key_registry;
        self
    }

    pub fn key_registry_mut(&mut self) -> &mut MethodDataSourceKeyRegistry {
        &mut self.key_registry
    }

    /// Register a router under its name; names must be unique
    pub fn register_router(&mut self, router: Arc<dyn DataSourceKeyRouter>) -> Result<&mut Self, AppError> {
        let name = router.name().to_string();
        if self.routers.contains_key(&name) {
            return Err(AppError::Configuration(format!(
                "router {} is already registered",
                name
            )));
        }
        tracing::info!("Registered datasource key router {}", name);
        self.routers.insert(name, router);
        Ok(self)
    }

    /// Register round-robin, random and weighted-random, weights taken from the registry
    pub fn register_builtin_routers(&mut self) -> Result<&mut Self, AppError> {
        let weights: HashMap<String, u32> = self
            .registry
            .iter()
            .map(|ds| (ds.id().to_string(), ds.weight()))
            .collect();

        self.register_router(Arc::new(RoundRobinRouter::new()))?;
        self.register_router(Arc::new(RandomRouter::new()))?;
        self.register_router(Arc::new(WeightedRandomRouter::new(weights)))?;
        Ok(self)
    }

    pub fn default_router(&mut self, name: impl Into<String>) -> &mut Self {
        self.default_router = Some(name.into());
        self
    }

    pub fn default_group(&mut self, group: impl Into<String>) -> &mut Self {
        self.default_group = Some(group.into());
        self
    }

    /// Allocate a router to a group; re-allocating replaces the earlier router
    pub fn allocate_router(&mut self, group: impl Into<String>, router: impl Into<String>) -> &mut Self {
        let group = group.into();
        let router = router.into();
        if let Some(previous) = self.group_routers.insert(group.clone(), router.clone()) {
            tracing::info!("Router for group {} changed from {} to {}", group, previous, router);
        } else {
            tracing::info!("Allocated router {} to group {}", router, group);
        }
        self
    }

    /// Compile and allocate a write pattern to a group; re-allocating replaces it
    pub fn allocate_write_matcher(&mut self, group: impl Into<String>, pattern: &str) -> Result<&mut Self, AppError> {
        let group = group.into();
        let matcher = WriteOperationMatcher::new(pattern)?;
        tracing::info!("Allocated write pattern {} to group {}", pattern, group);
        self.write_matchers.insert(group, matcher);
        Ok(self)
    }

    /// Validate every allocation and freeze the table
    pub fn build(self) -> Result<DataSourceKeySelector, AppError> {
        if let Some(name) = &self.default_router {
            if !self.routers.contains_key(name) {
                return Err(AppError::Configuration(format!(
                    "default router {} is not registered",
                    name
                )));
            }
        }

        if let Some(group) = &self.default_group {
            if !self.registry.has_group(group) {
                return Err(AppError::Configuration(format!(
                    "default group {} has no datasource",
                    group
                )));
            }
        }

        for (group, router) in &self.group_routers {
            if !self.registry.has_group(group) {
                return Err(AppError::Configuration(format!(
                    "router {} is allocated to unknown group {}",
                    router, group
                )));
            }
            if !self.routers.contains_key(router) {
                return Err(AppError::Configuration(format!(
                    "group {} is allocated to unknown router {}",
                    group, router
                )));
            }
        }

        for group in self.write_matchers.keys() {
            if !self.registry.has_group(group) {
                return Err(AppError::Configuration(format!(
                    "write pattern is allocated to unknown group {}",
                    group
                )));
            }
        }

        for (operation, key) in self.key_registry.declared_keys() {
            if !self.registry.contains(key) {
                return Err(AppError::Configuration(format!(
                    "operation {} is declared on unknown datasource {}",
                    operation, key
                )));
            }
        }

        Ok(DataSourceKeySelector {
            registry: self.registry,
            key_registry: self.key_registry,
            table: RouterAllocationTable {
                routers: self.routers,
                default_router: self.default_router,
                default_group: self.default_group,
                group_routers: self.group_routers,
                write_matchers: self.write_matchers,
            },
        })
    }
}

/// Resolves exactly one datasource key per invocation.
///
/// Resolution order: explicit declaration, then write pinning to the group's
/// primary, then the group's router (or the default router).
pub struct DataSourceKeySelector {
    registry: Arc<DataSourceRegistry>,
    key_registry: MethodDataSourceKeyRegistry,
    table: RouterAllocationTable,
}

impl DataSourceKeySelector {
    pub fn builder(registry: Arc<DataSourceRegistry>) -> SelectorBuilder {
        SelectorBuilder::new(registry)
    }

    pub fn registry(&self) -> &Arc<DataSourceRegistry> {
        &self.registry
    }

    pub fn table(&self) -> &RouterAllocationTable {
        &self.table
    }

    pub fn select(&self, invocation: &InvocationDescriptor) -> Result<DataSourceKey, AppError> {
        if let Some(key_id) = self.key_registry.find(invocation) {
            let datasource = self.registry.get(&key_id).ok_or_else(|| {
                AppError::Routing(format!(
                    "{} declares datasource {} which is not registered",
                    invocation.operation, key_id
                ))
            })?;
            tracing::debug!("{} routed to declared datasource {}", invocation.operation, datasource.key());
            return Ok(datasource.key().clone());
        }

        let group = self.resolve_group(invocation)?;

        if self.is_write_in(group, invocation) {
            let primary = self.registry.primary_of(group).ok_or_else(|| {
                AppError::Routing(format!(
                    "write operation {} has no primary datasource in group {}",
                    invocation.operation, group
                ))
            })?;
            tracing::debug!("{} routed to primary {}", invocation.operation, primary);
            return Ok(primary.clone());
        }

        let router = self.table.router_for(group).ok_or_else(|| {
            AppError::Routing(format!(
                "no router allocated to group {} and no default router configured",
                group
            ))
        })?;

        let key = router.select(self.registry.read_candidates(group), invocation)?;
        tracing::debug!("{} routed by {} to {}", invocation.operation, router.name(), key);
        Ok(key)
    }

    /// Whether the invocation counts as a write in its resolved group
    pub fn is_write(&self, invocation: &InvocationDescriptor) -> bool {
        match self.resolve_group(invocation) {
            Ok(group) => self.is_write_in(group, invocation),
            Err(_) => false,
        }
    }

    fn is_write_in(&self, group: &str, invocation: &InvocationDescriptor) -> bool {
        self.table
            .write_matcher(group)
            .map(|matcher| matcher.is_write(invocation))
            .unwrap_or(false)
    }

    fn resolve_group<'a>(&'a self, invocation: &'a InvocationDescriptor) -> Result<&'a str, AppError> {
        let group = invocation
            .group
            .as_deref()
            .or(self.table.default_group())
            .ok_or_else(|| {
                AppError::Routing(format!(
                    "{} has no group and no default group is configured",
                    invocation.operation
                ))
            })?;

        if !self.registry.has_group(group) {
            return Err(AppError::Routing(format!(
                "group {} has no registered datasource",
                group
            )));
        }
        Ok(group)
    }
}
