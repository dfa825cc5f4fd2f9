//! Multi-record ledger writes with compensation.
//!
//! The stores have no shared transaction, so a ledger change that touches
//! several records is applied one write at a time. If a write fails, the
//! writes already applied are undone in reverse order before the error is
//! returned. Callers hold the balance locks for the whole change, which
//! makes restoring the previous balance record safe.

use crate::storage::Stores;
use crate::{Balance, Operation, Result};
use std::fmt;

/// One record write in a ledger change.
pub(crate) enum LedgerWrite {
    CreateOperation(Operation),
    UpdateOperation { previous: Operation, next: Operation },
    UpdateBalance { previous: Balance, next: Balance },
}

impl LedgerWrite {
    async fn apply(&self, stores: &Stores) -> anyhow::Result<()> {
        match self {
            LedgerWrite::CreateOperation(op) => stores.operations.create_operation(op).await,
            LedgerWrite::UpdateOperation { next, .. } => {
                stores.operations.update_operation(next).await
            }
            LedgerWrite::UpdateBalance { next, .. } => stores.balances.update_balance(next).await,
        }
    }

    async fn undo(&self, stores: &Stores) -> anyhow::Result<()> {
        match self {
            LedgerWrite::CreateOperation(op) => {
                stores.operations.delete_operation(&op.operation_id).await
            }
            LedgerWrite::UpdateOperation { previous, .. } => {
                stores.operations.update_operation(previous).await
            }
            LedgerWrite::UpdateBalance { previous, .. } => {
                stores.balances.update_balance(previous).await
            }
        }
    }
}

impl fmt::Display for LedgerWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerWrite::CreateOperation(op) => write!(f, "create operation {}", op.operation_id),
            LedgerWrite::UpdateOperation { next, .. } => {
                write!(f, "update operation {}", next.operation_id)
            }
            LedgerWrite::UpdateBalance { next, .. } => {
                write!(f, "update balance {}", next.balance_id)
            }
        }
    }
}

/// Apply `writes` in order; on failure undo the applied ones and return the
/// original error.
pub(crate) async fn commit(stores: &Stores, writes: &[LedgerWrite]) -> Result<()> {
    for (applied, write) in writes.iter().enumerate() {
        if let Err(err) = write.apply(stores).await {
            tracing::warn!(error = %err, "{} failed, rolling back", write);
            for done in writes[..applied].iter().rev() {
                if let Err(undo_err) = done.undo(stores).await {
                    tracing::error!(error = %undo_err, "could not roll back {}", done);
                }
            }
            return Err(err.into());
        }
    }
    Ok(())
}
