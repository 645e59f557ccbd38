use uuid::Uuid;

use super::{Propagation, Transaction, TransactionContext, TransactionDefinition, TransactionalResource};
use crate::api::middleware::AppError;
use crate::models::DataSourceKey;

/// Outcome of `TransactionManager::begin`, handed back on commit or rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionStatus {
    transaction_id: Option<Uuid>,
    new_transaction: bool,
    suspended: bool,
}

impl TransactionStatus {
    /// Transaction the scope runs in, if any
    pub fn transaction_id(&self) -> Option<Uuid> {
        self.transaction_id
    }

    /// Whether this scope created (and therefore completes) the transaction
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    /// Whether an outer transaction was suspended for this scope
    pub fn has_suspended(&self) -> bool {
        self.suspended
    }
}

/// Creates transactions and completes them against their bound resources.
///
/// Resources are committed one after another in bind order; there is no
/// two-phase protocol across datasources.
#[derive(Debug)]
pub struct TransactionManager {
    id: Uuid,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Start a scope in the context according to the definition's propagation
    pub fn begin(
        &self,
        ctx: &mut TransactionContext,
        definition: TransactionDefinition,
    ) -> Result<TransactionStatus, AppError> {
        let active = ctx.current().map(Transaction::id);

        match (definition.propagation, active) {
            (Propagation::Required | Propagation::Supports | Propagation::Mandatory, Some(id)) => {
                tracing::debug!("{} joins transaction {}", definition.name, id);
                Ok(TransactionStatus {
                    transaction_id: Some(id),
                    new_transaction: false,
                    suspended: false,
                })
            }
            (Propagation::Required, None) => Ok(self.start(ctx, definition, false)),
            (Propagation::RequiresNew, active) => {
                let suspended = active.is_some();
                if suspended {
                    ctx.suspend();
                }
                Ok(self.start(ctx, definition, suspended))
            }
            (Propagation::Supports, None) => Ok(TransactionStatus {
                transaction_id: None,
                new_transaction: false,
                suspended: false,
            }),
            (Propagation::Mandatory, None) => Err(AppError::Transaction(format!(
                "{} requires an existing transaction",
                definition.name
            ))),
            (Propagation::NotSupported, active) => {
                let suspended = active.is_some();
                if suspended {
                    ctx.suspend();
                }
                Ok(TransactionStatus {
                    transaction_id: None,
                    new_transaction: false,
                    suspended,
                })
            }
            (Propagation::Never, Some(id)) => Err(AppError::Transaction(format!(
                "{} must not run inside transaction {}",
                definition.name, id
            ))),
            (Propagation::Never, None) => Ok(TransactionStatus {
                transaction_id: None,
                new_transaction: false,
                suspended: false,
            }),
        }
    }

    fn start(&self, ctx: &mut TransactionContext, definition: TransactionDefinition, suspended: bool) -> TransactionStatus {
        let transaction = Transaction::new(self.id, definition);
        let id = transaction.id();
        tracing::debug!("Started transaction {} {}", id, transaction);
        ctx.set(transaction);
        TransactionStatus {
            transaction_id: Some(id),
            new_transaction: true,
            suspended,
        }
    }

    /// Complete a scope successfully.
    ///
    /// Participants return immediately. The owning scope commits every bound resource,
    /// or rolls them back and fails when the transaction is rollback-only or timed out.
    pub async fn commit(&self, ctx: &mut TransactionContext, status: TransactionStatus) -> Result<(), AppError> {
        if !status.new_transaction {
            if status.suspended {
                ctx.resume();
            }
            return Ok(());
        }

        let mut transaction = self.take_owned(ctx, &status)?;
        let resources = transaction.clear_resources();

        let abort_reason = if transaction.is_rollback_only() {
            Some("was marked rollback-only")
        } else if transaction.is_expired() {
            Some("timed out")
        } else {
            None
        };

        let outcome = match abort_reason {
            Some(reason) => {
                tracing::warn!("Transaction {} {}; rolling back", transaction.id(), reason);
                Self::rollback_all(resources).await.and(Err(AppError::Transaction(format!(
                    "transaction {} {} and has been rolled back",
                    transaction.id(),
                    reason
                ))))
            }
            None => Self::commit_all(resources).await,
        };

        if status.suspended {
            ctx.resume();
        }

        if outcome.is_ok() {
            tracing::debug!("Committed transaction {}", transaction.id());
        }
        outcome
    }

    /// Abort a scope.
    ///
    /// The owning scope rolls back every bound resource; a participant marks the
    /// shared transaction rollback-only so that its owner cannot commit.
    pub async fn rollback(&self, ctx: &mut TransactionContext, status: TransactionStatus) -> Result<(), AppError> {
        if !status.new_transaction {
            if status.transaction_id.is_some() {
                if let Some(transaction) = ctx.current_mut() {
                    transaction.set_rollback_only();
                }
            }
            if status.suspended {
                ctx.resume();
            }
            return Ok(());
        }

        let mut transaction = self.take_owned(ctx, &status)?;
        let outcome = Self::rollback_all(transaction.clear_resources()).await;
        tracing::debug!("Rolled back transaction {}", transaction.id());

        if status.suspended {
            ctx.resume();
        }
        outcome
    }

    /// Detach the transaction the status refers to; it must be current and ours
    fn take_owned(&self, ctx: &mut TransactionContext, status: &TransactionStatus) -> Result<Transaction, AppError> {
        let current = ctx.current().ok_or_else(|| {
            AppError::Transaction("no active transaction to complete".to_string())
        })?;
        if Some(current.id()) != status.transaction_id {
            return Err(AppError::Transaction(format!(
                "transaction {} is not the active transaction",
                status.transaction_id.map(|id| id.to_string()).unwrap_or_default()
            )));
        }
        if current.manager_id() != self.id {
            return Err(AppError::Transaction(format!(
                "transaction {} belongs to another manager",
                current.id()
            )));
        }
        ctx.clear()
            .ok_or_else(|| AppError::Transaction("no active transaction to complete".to_string()))
    }

    async fn commit_all(
        resources: Vec<(DataSourceKey, Box<dyn TransactionalResource>)>,
    ) -> Result<(), AppError> {
        let mut pending = resources.into_iter();
        while let Some((key, resource)) = pending.next() {
            if let Err(e) = resource.commit().await {
                tracing::error!("Commit failed on {}: {}; rolling back the remaining resources", key, e);
                if let Err(rollback_error) = Self::rollback_all(pending.collect()).await {
                    tracing::warn!("Rollback after failed commit on {} also failed: {}", key, rollback_error);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn rollback_all(
        resources: Vec<(DataSourceKey, Box<dyn TransactionalResource>)>,
    ) -> Result<(), AppError> {
        let mut first_error = None;
        for (key, resource) in resources {
            if let Err(e) = resource.rollback().await {
                tracing::error!("Rollback failed on {}: {}", key, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
