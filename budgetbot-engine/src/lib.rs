//! # budgetbot engine
//!
//! Recurring-subscription scheduling and ledger mutation for budgetbot.
//!
//! ## Moving parts
//! - [`Amount`]: fixed-point decimal used for every balance and operation value
//! - [`billing`]: deterministic billing-date generation per subscription period
//! - [`ledger`]: in-place balance arithmetic for each operation kind
//! - [`WorkerPool`]: bounded executor with per-key in-flight deduplication
//! - [`SubscriptionScheduler`]: occurrence pre-materialization and the poll loop
//! - [`OperationMaterializer`]: turns a due occurrence into a spending operation
//!
//! Persistence is abstracted behind the traits in [`storage`]; a JSON file
//! backend ([`FileStorage`]) ships with the crate.

pub mod amount;
pub mod balance;
pub mod billing;
pub mod config;
pub mod ledger;
pub mod locks;
pub mod materializer;
pub mod operation;
pub mod pool;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod subscription;
mod writes;

pub use amount::Amount;
pub use balance::{Balance, Category};
pub use billing::{generate_billing_dates, BillingPeriod, LookaheadWindow};
pub use config::EngineConfig;
pub use ledger::{AmountChange, BalanceRefs, LedgerAction, LedgerOutcome, TransferLegs};
pub use locks::BalanceLocks;
pub use materializer::OperationMaterializer;
pub use operation::{Operation, OperationType};
pub use pool::{JobHandler, PoolStats, WorkerPool};
pub use scheduler::{today_window, SubscriptionScheduler};
pub use service::LedgerService;
pub use storage::{
    BalanceStore, CategoryStore, FileStorage, OccurrenceStore, OperationStore, Stores,
    SubscriptionStore,
};
pub use subscription::{BalanceSubscription, ScheduledOccurrence};

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),
    #[error("balance not found: {0}")]
    BalanceNotFound(String),
    #[error("category not found: {0}")]
    CategoryNotFound(String),
    #[error("operation not found: {0}")]
    OperationNotFound(String),
    #[error("invalid amount format: {0}")]
    InvalidFormat(String),
    #[error("invalid subscription period: {0}")]
    InvalidPeriod(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("store failure: {0:#}")]
    Store(anyhow::Error),
    #[error("worker pool is closed")]
    PoolClosed,
}

impl EngineError {
    /// True for errors caused by a missing record; the job is skipped.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::SubscriptionNotFound(_)
                | EngineError::BalanceNotFound(_)
                | EngineError::CategoryNotFound(_)
                | EngineError::OperationNotFound(_)
        )
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Store(err)
    }
}

/// Generate a prefixed record id (`sub_…`, `occ_…`, `op_…`).
pub(crate) fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}
