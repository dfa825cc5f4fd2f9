//! Turns a due occurrence into a spending operation.

use crate::ledger::{self, AmountChange, BalanceRefs, LedgerAction};
use crate::pool::JobHandler;
use crate::storage::Stores;
use crate::writes::{self, LedgerWrite};
use crate::{
    BalanceLocks, EngineError, Operation, OperationType, Result, ScheduledOccurrence,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Materializes scheduled occurrences; the worker pool's job handler.
///
/// For one occurrence:
/// 1. load the subscription, its balance and its category
/// 2. record a spending operation linked to the occurrence
/// 3. charge the balance
/// 4. delete the occurrence
///
/// Steps 2 and 3 commit together: if the balance write fails, the
/// operation is deleted again. Any failure before step 4 leaves the
/// occurrence in place so the next poll retries it. An operation already
/// recorded for the occurrence is never charged twice: the retry only
/// deletes the occurrence.
pub struct OperationMaterializer {
    stores: Stores,
    locks: Arc<BalanceLocks>,
}

impl OperationMaterializer {
    pub fn new(stores: Stores, locks: Arc<BalanceLocks>) -> Self {
        Self { stores, locks }
    }

    #[tracing::instrument(
        skip(self, occurrence),
        fields(
            occurrence_id = %occurrence.occurrence_id,
            subscription_id = %occurrence.subscription_id
        )
    )]
    pub async fn materialize(&self, occurrence: &ScheduledOccurrence) -> Result<Operation> {
        if let Some(existing) = self
            .stores
            .operations
            .find_by_occurrence(&occurrence.occurrence_id)
            .await?
        {
            tracing::info!(
                operation_id = %existing.operation_id,
                "occurrence already materialized, removing it"
            );
            self.stores
                .occurrences
                .delete_occurrence(&occurrence.occurrence_id)
                .await?;
            return Ok(existing);
        }

        let subscription = self
            .stores
            .subscriptions
            .get_subscription(&occurrence.subscription_id)
            .await?
            .ok_or_else(|| EngineError::SubscriptionNotFound(occurrence.subscription_id.clone()))?;

        let _guard = self.locks.lock(&subscription.balance_id).await;

        let balance = self
            .stores
            .balances
            .get_balance(&subscription.balance_id)
            .await?
            .ok_or_else(|| EngineError::BalanceNotFound(subscription.balance_id.clone()))?;

        let category = self
            .stores
            .categories
            .get_category(&subscription.category_id)
            .await?
            .ok_or_else(|| EngineError::CategoryNotFound(subscription.category_id.clone()))?;

        let mut next_amount = balance.amount;
        let outcome = ledger::apply(
            LedgerAction::Create,
            OperationType::Spending,
            BalanceRefs::single(&mut next_amount),
            &AmountChange::new(subscription.amount),
        );
        if !outcome.is_applied() {
            return Err(EngineError::InvalidArgument(format!(
                "cannot charge {} to balance {}",
                subscription.amount, balance.balance_id
            )));
        }

        let operation = Operation::new(
            balance.balance_id.clone(),
            OperationType::Spending,
            subscription.amount,
            subscription.charge_description(),
        )
        .with_category(Some(category.category_id))
        .with_occurrence(
            subscription.subscription_id.clone(),
            occurrence.occurrence_id.clone(),
        );
        let mut charged = balance.clone();
        charged.amount = next_amount;
        charged.touch();
        writes::commit(
            &self.stores,
            &[
                LedgerWrite::CreateOperation(operation.clone()),
                LedgerWrite::UpdateBalance {
                    previous: balance,
                    next: charged.clone(),
                },
            ],
        )
        .await?;

        self.stores
            .occurrences
            .delete_occurrence(&occurrence.occurrence_id)
            .await?;

        tracing::info!(
            operation_id = %operation.operation_id,
            balance_id = %charged.balance_id,
            amount = %subscription.amount,
            balance = %charged.amount.to_fixed(),
            "subscription charge recorded"
        );
        Ok(operation)
    }
}

#[async_trait]
impl JobHandler<String, ScheduledOccurrence> for OperationMaterializer {
    async fn handle(&self, _key: &String, occurrence: ScheduledOccurrence) -> Result<()> {
        self.materialize(&occurrence).await.map(|_| ())
    }
}
