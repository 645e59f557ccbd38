// Units of work and the resources bound to them
pub mod definition;
pub mod manager;
pub mod resource;
pub mod transaction;

pub use definition::{Isolation, Propagation, TransactionDefinition};
pub use manager::{TransactionManager, TransactionStatus};
pub use resource::{PooledResourceProvider, ResourceProvider, TransactionalResource};
pub use transaction::{Transaction, TransactionContext};

#[cfg(test)]
pub(crate) use resource::test_support;
