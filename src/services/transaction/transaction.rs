use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use super::{TransactionDefinition, TransactionalResource};
use crate::models::DataSourceKey;

type BoundResource = (DataSourceKey, Box<dyn TransactionalResource>);

/// One logical unit of work and the resources bound to it.
///
/// Only `TransactionManager::begin` creates transactions. A transaction tracks which
/// resource is bound under which key; releasing a resource stays with its owner.
pub struct Transaction {
    id: Uuid,
    manager_id: Uuid,
    definition: TransactionDefinition,
    started_at: DateTime<Utc>,
    rollback_only: bool,
    resources: Vec<BoundResource>,
}

impl Transaction {
    pub(super) fn new(manager_id: Uuid, definition: TransactionDefinition) -> Self {
        Self {
            id: Uuid::new_v4(),
            manager_id,
            definition,
            started_at: Utc::now(),
            rollback_only: false,
            resources: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Id of the manager that created this transaction
    pub fn manager_id(&self) -> Uuid {
        self.manager_id
    }

    pub fn definition(&self) -> &TransactionDefinition {
        &self.definition
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Mark the unit of work as unable to commit. There is no way back.
    pub fn set_rollback_only(&mut self) {
        if !self.rollback_only {
            tracing::warn!("Transaction {} ({}) marked rollback-only", self.id, self.definition.name);
        }
        self.rollback_only = true;
    }

    /// Whether the definition's timeout has elapsed
    pub fn is_expired(&self) -> bool {
        let Some(timeout) = self.definition.timeout else {
            return false;
        };
        Utc::now()
            .signed_duration_since(self.started_at)
            .to_std()
            .map(|elapsed| elapsed > timeout)
            .unwrap_or(false)
    }

    /// Bind a resource under a key; the last bind wins and the replaced
    /// resource is handed back. A missing key is a no-op that returns the resource.
    pub fn bind_resource(
        &mut self,
        key: Option<DataSourceKey>,
        resource: Box<dyn TransactionalResource>,
    ) -> Option<Box<dyn TransactionalResource>> {
        let Some(key) = key else {
            return Some(resource);
        };
        match self.resources.iter_mut().find(|(bound, _)| *bound == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, resource)),
            None => {
                tracing::debug!("Bound resource {} to transaction {}", key, self.id);
                self.resources.push((key, resource));
                None
            }
        }
    }

    pub fn has_resource(&self, key: Option<&DataSourceKey>) -> bool {
        match key {
            Some(key) => self.resources.iter().any(|(bound, _)| bound == key),
            None => false,
        }
    }

    pub fn resource(&self, key: Option<&DataSourceKey>) -> Option<&dyn TransactionalResource> {
        let key = key?;
        self.resources
            .iter()
            .find(|(bound, _)| bound == key)
            .map(|(_, resource)| resource.as_ref())
    }

    /// Remove the binding and hand the resource back to the caller
    pub fn unbind_resource(&mut self, key: Option<&DataSourceKey>) -> Option<Box<dyn TransactionalResource>> {
        let key = key?;
        let position = self.resources.iter().position(|(bound, _)| bound == key)?;
        Some(self.resources.remove(position).1)
    }

    /// Remove every binding, returning them in bind order
    pub fn clear_resources(&mut self) -> Vec<(DataSourceKey, Box<dyn TransactionalResource>)> {
        std::mem::take(&mut self.resources)
    }

    /// Bound keys in bind order
    pub fn resource_keys(&self) -> Vec<&DataSourceKey> {
        self.resources.iter().map(|(key, _)| key).collect()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("definition", &self.definition)
            .field("rollback_only", &self.rollback_only)
            .field("resources", &self.resource_keys())
            .finish()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.definition, f)
    }
}

/// Transaction state carried explicitly along one logical call chain.
///
/// Holds the active transaction plus the transactions suspended beneath it.
/// A context belongs to exactly one call chain and is never shared.
#[derive(Debug, Default)]
pub struct TransactionContext {
    current: Option<Transaction>,
    suspended: Vec<Transaction>,
}

impl TransactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Transaction> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut Transaction> {
        self.current.as_mut()
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Install a transaction, returning the one it replaces
    pub fn set(&mut self, transaction: Transaction) -> Option<Transaction> {
        self.current.replace(transaction)
    }

    pub fn clear(&mut self) -> Option<Transaction> {
        self.current.take()
    }

    pub fn suspended_count(&self) -> usize {
        self.suspended.len()
    }

    pub(super) fn suspend(&mut self) {
        if let Some(transaction) = self.current.take() {
            tracing::debug!("Suspending transaction {}", transaction.id());
            self.suspended.push(transaction);
        }
    }

    pub(super) fn resume(&mut self) {
        if let Some(transaction) = self.suspended.pop() {
            tracing::debug!("Resuming transaction {}", transaction.id());
            self.current = Some(transaction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataSourceRole;
    use crate::services::transaction::resource::test_support::RecordingResource;

    fn key(id: &str) -> DataSourceKey {
        DataSourceKey::new("orders", id, DataSourceRole::Primary)
    }

    fn transaction() -> Transaction {
        Transaction::new(Uuid::new_v4(), TransactionDefinition::new("test"))
    }

    #[test]
    fn test_bind_and_lookup() {
        let mut tx = transaction();
        let (resource, _journal) = RecordingResource::new(key("a"));
        assert!(tx.bind_resource(Some(key("a")), resource).is_none());
        assert!(tx.has_resource(Some(&key("a"))));
        assert!(!tx.has_resource(Some(&key("b"))));
        assert_eq!(tx.resource(Some(&key("a"))).unwrap().key(), &key("a"));
    }

    #[test]
    fn test_missing_key_is_noop() {
        let mut tx = transaction();
        let (resource, _journal) = RecordingResource::new(key("a"));
        assert!(tx.bind_resource(None, resource).is_some());
        assert!(tx.resource_keys().is_empty());
        assert!(!tx.has_resource(None));
        assert!(tx.unbind_resource(None).is_none());
        assert!(tx.resource(None).is_none());
    }

    #[test]
    fn test_last_bind_wins_and_keeps_position() {
        let mut tx = transaction();
        let (first, _) = RecordingResource::new(key("a"));
        let (other, _) = RecordingResource::new(key("b"));
        let (second, _) = RecordingResource::new(key("a"));
        tx.bind_resource(Some(key("a")), first);
        tx.bind_resource(Some(key("b")), other);
        assert!(tx.bind_resource(Some(key("a")), second).is_some());

        let ids: Vec<&str> = tx.resource_keys().iter().map(|k| k.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_unbind_and_clear() {
        let mut tx = transaction();
        for id in ["a", "b", "c"] {
            let (resource, _) = RecordingResource::new(key(id));
            tx.bind_resource(Some(key(id)), resource);
        }
        assert!(tx.unbind_resource(Some(&key("b"))).is_some());
        assert!(tx.unbind_resource(Some(&key("b"))).is_none());

        let cleared: Vec<String> = tx.clear_resources().into_iter().map(|(k, _)| k.id().to_string()).collect();
        assert_eq!(cleared, vec!["a", "c"]);
        assert!(tx.resource_keys().is_empty());
    }

    #[test]
    fn test_rollback_only_is_monotonic() {
        let mut tx = transaction();
        assert!(!tx.is_rollback_only());
        tx.set_rollback_only();
        tx.set_rollback_only();
        assert!(tx.is_rollback_only());
    }

    #[test]
    fn test_expiry() {
        let tx = transaction();
        assert!(!tx.is_expired());

        let tx = Transaction::new(
            Uuid::new_v4(),
            TransactionDefinition::new("short").with_timeout(std::time::Duration::from_millis(1)),
        );
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(tx.is_expired());
    }

    #[test]
    fn test_context_suspend_resume() {
        let mut ctx = TransactionContext::new();
        let outer = transaction();
        let outer_id = outer.id();
        ctx.set(outer);
        ctx.suspend();
        assert!(!ctx.is_active());
        assert_eq!(ctx.suspended_count(), 1);

        ctx.set(transaction());
        ctx.clear();
        ctx.resume();
        assert_eq!(ctx.current().unwrap().id(), outer_id);
        assert_eq!(ctx.suspended_count(), 0);
    }
}
