//! User-initiated ledger writes: income, spending, transfers and edits.

use crate::ledger::{self, AmountChange, BalanceRefs, LedgerAction, LedgerOutcome};
use crate::storage::Stores;
use crate::writes::{self, LedgerWrite};
use crate::{
    Amount, Balance, BalanceLocks, Category, EngineError, Operation, OperationType, Result,
};
use std::sync::Arc;

/// Records operations and moves balances with the ledger calculator.
///
/// Every balance read-modify-write happens under the balance's lock from the
/// shared [`BalanceLocks`], so writes from here and from the materializer
/// never interleave on one balance. A change that fails partway is rolled
/// back: no operation is left behind without its balance change.
#[derive(Clone)]
pub struct LedgerService {
    stores: Stores,
    locks: Arc<BalanceLocks>,
}

impl LedgerService {
    pub fn new(stores: Stores, locks: Arc<BalanceLocks>) -> Self {
        Self { stores, locks }
    }

    pub async fn create_balance(
        &self,
        user_id: &str,
        name: &str,
        currency: &str,
        initial: Amount,
    ) -> Result<Balance> {
        let balance = Balance::new(
            user_id.to_string(),
            name.to_string(),
            currency.to_uppercase(),
            initial,
        );
        balance.validate()?;
        self.stores.balances.create_balance(&balance).await?;
        tracing::info!(balance_id = %balance.balance_id, currency = %balance.currency, "balance created");
        Ok(balance)
    }

    pub async fn create_category(&self, user_id: &str, name: &str) -> Result<Category> {
        if name.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "Category name cannot be empty".to_string(),
            ));
        }
        let category = Category::new(user_id.to_string(), name.trim().to_string());
        self.stores.categories.create_category(&category).await?;
        Ok(category)
    }

    pub async fn balance(&self, balance_id: &str) -> Result<Balance> {
        self.load_balance(balance_id).await
    }

    pub async fn balances(&self) -> Result<Vec<Balance>> {
        Ok(self.stores.balances.list_balances().await?)
    }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.stores.categories.list_categories().await?)
    }

    /// Operations touching a balance, oldest first.
    pub async fn operations(&self, balance_id: &str) -> Result<Vec<Operation>> {
        self.load_balance(balance_id).await?;
        Ok(self.stores.operations.list_operations(balance_id).await?)
    }

    pub async fn record_incoming(
        &self,
        balance_id: &str,
        amount: Amount,
        category_id: Option<&str>,
        description: &str,
    ) -> Result<Operation> {
        self.record_single(OperationType::Incoming, balance_id, amount, category_id, description)
            .await
    }

    pub async fn record_spending(
        &self,
        balance_id: &str,
        amount: Amount,
        category_id: Option<&str>,
        description: &str,
    ) -> Result<Operation> {
        self.record_single(OperationType::Spending, balance_id, amount, category_id, description)
            .await
    }

    #[tracing::instrument(skip(self, amount, description), fields(amount = %amount))]
    async fn record_single(
        &self,
        kind: OperationType,
        balance_id: &str,
        amount: Amount,
        category_id: Option<&str>,
        description: &str,
    ) -> Result<Operation> {
        require_positive("amount", &amount)?;
        if let Some(category_id) = category_id {
            self.stores
                .categories
                .get_category(category_id)
                .await?
                .ok_or_else(|| EngineError::CategoryNotFound(category_id.to_string()))?;
        }

        let _guard = self.locks.lock(balance_id).await;
        let previous = self.load_balance(balance_id).await?;
        let mut balance = previous.clone();

        let outcome = ledger::apply(
            LedgerAction::Create,
            kind,
            BalanceRefs::single(&mut balance.amount),
            &AmountChange::new(amount),
        );
        ensure_applied(outcome, balance_id)?;

        let operation = Operation::new(balance_id.to_string(), kind, amount, description.to_string())
            .with_category(category_id.map(str::to_string));
        balance.touch();
        writes::commit(
            &self.stores,
            &[
                LedgerWrite::CreateOperation(operation.clone()),
                LedgerWrite::UpdateBalance {
                    previous,
                    next: balance.clone(),
                },
            ],
        )
        .await?;

        tracing::info!(
            operation_id = %operation.operation_id,
            balance = %balance.amount.to_fixed(),
            "{} recorded",
            kind
        );
        Ok(operation)
    }

    /// Move money between two balances.
    ///
    /// Without an exchange rate the balances must share a currency and one
    /// `transfer` operation is recorded on the source. With a rate, a
    /// `transfer_out` on the source and a `transfer_in` on the destination
    /// are recorded, the latter pointing at the former. `amount` is always
    /// the sent side. Returns the recorded operations, source first.
    #[tracing::instrument(skip(self, amount, description), fields(amount = %amount))]
    pub async fn record_transfer(
        &self,
        from_id: &str,
        to_id: &str,
        amount: Amount,
        exchange_rate: Option<Amount>,
        description: &str,
    ) -> Result<Vec<Operation>> {
        require_positive("amount", &amount)?;
        if let Some(rate) = &exchange_rate {
            require_positive("exchange rate", rate)?;
        }
        if from_id == to_id {
            return Err(EngineError::InvalidArgument(
                "cannot transfer to the same balance".to_string(),
            ));
        }

        let _guard = self.locks.lock_pair(from_id, to_id).await;
        let from_before = self.load_balance(from_id).await?;
        let to_before = self.load_balance(to_id).await?;
        let mut from = from_before.clone();
        let mut to = to_before.clone();
        if exchange_rate.is_none() && from.currency != to.currency {
            return Err(EngineError::InvalidArgument(format!(
                "exchange rate required to transfer {} to {}",
                from.currency, to.currency
            )));
        }

        let kind = match exchange_rate {
            Some(_) => OperationType::TransferOut,
            None => OperationType::Transfer,
        };
        let outcome = ledger::apply(
            LedgerAction::Create,
            kind,
            BalanceRefs::transfer(&mut from.amount, &mut to.amount),
            &AmountChange::new(amount).with_exchange_rate(exchange_rate),
        );
        let legs = match outcome {
            LedgerOutcome::Transfer(legs) => legs,
            _ => {
                return Err(EngineError::InvalidArgument(format!(
                    "cannot transfer {} from {}",
                    amount, from_id
                )))
            }
        };

        let operations = match exchange_rate {
            None => vec![Operation::new(
                from_id.to_string(),
                OperationType::Transfer,
                amount,
                description.to_string(),
            )
            .with_transfer_balance(to_id.to_string())],
            Some(rate) => {
                let out = Operation::new(
                    from_id.to_string(),
                    OperationType::TransferOut,
                    legs.transfer_out,
                    description.to_string(),
                )
                .with_transfer_balance(to_id.to_string())
                .with_exchange_rate(Some(rate));
                let incoming = Operation::new(
                    to_id.to_string(),
                    OperationType::TransferIn,
                    legs.transfer_in,
                    description.to_string(),
                )
                .with_transfer_balance(from_id.to_string())
                .with_exchange_rate(Some(rate))
                .with_parent(out.operation_id.clone());
                vec![out, incoming]
            }
        };

        from.touch();
        to.touch();
        let mut planned: Vec<LedgerWrite> = operations
            .iter()
            .cloned()
            .map(LedgerWrite::CreateOperation)
            .collect();
        planned.push(LedgerWrite::UpdateBalance {
            previous: from_before,
            next: from,
        });
        planned.push(LedgerWrite::UpdateBalance {
            previous: to_before,
            next: to,
        });
        writes::commit(&self.stores, &planned).await?;

        tracing::info!(
            sent = %legs.transfer_out.to_fixed(),
            received = %legs.transfer_in.to_fixed(),
            "transfer recorded"
        );
        Ok(operations)
    }

    /// Change an operation's amount and rebalance the affected balances.
    ///
    /// For a rated transfer, editing either leg recomputes the other from
    /// the stored rate and rewrites both operations. Returns the edited
    /// operation.
    #[tracing::instrument(skip(self, new_amount), fields(new_amount = %new_amount))]
    pub async fn update_operation_amount(
        &self,
        operation_id: &str,
        new_amount: Amount,
    ) -> Result<Operation> {
        require_positive("amount", &new_amount)?;
        let operation = self.load_operation(operation_id).await?;

        match operation.kind {
            OperationType::Incoming | OperationType::Spending => {
                self.update_single(operation, new_amount).await
            }
            OperationType::Transfer => self.update_plain_transfer(operation, new_amount).await,
            OperationType::TransferIn | OperationType::TransferOut => {
                self.update_rated_transfer(operation, new_amount).await
            }
        }
    }

    async fn update_single(&self, operation: Operation, new_amount: Amount) -> Result<Operation> {
        let _guard = self.locks.lock(&operation.balance_id).await;
        // Re-read under the lock; a concurrent edit may have landed.
        let op_before = self.load_operation(&operation.operation_id).await?;
        let balance_before = self.load_balance(&op_before.balance_id).await?;
        let mut operation = op_before.clone();
        let mut balance = balance_before.clone();

        let outcome = ledger::apply(
            LedgerAction::Update,
            operation.kind,
            BalanceRefs::single(&mut balance.amount),
            &AmountChange::new(new_amount).with_old_amount(operation.amount),
        );
        ensure_applied(outcome, &balance.balance_id)?;

        operation.amount = new_amount;
        operation.touch();
        balance.touch();
        writes::commit(
            &self.stores,
            &[
                LedgerWrite::UpdateOperation {
                    previous: op_before,
                    next: operation.clone(),
                },
                LedgerWrite::UpdateBalance {
                    previous: balance_before,
                    next: balance,
                },
            ],
        )
        .await?;
        Ok(operation)
    }

    async fn update_plain_transfer(
        &self,
        operation: Operation,
        new_amount: Amount,
    ) -> Result<Operation> {
        let to_id = destination_of(&operation)?;
        let _guard = self.locks.lock_pair(&operation.balance_id, &to_id).await;
        let op_before = self.load_operation(&operation.operation_id).await?;
        let from_before = self.load_balance(&op_before.balance_id).await?;
        let to_before = self.load_balance(&to_id).await?;
        let mut operation = op_before.clone();
        let mut from = from_before.clone();
        let mut to = to_before.clone();

        let outcome = ledger::apply(
            LedgerAction::Update,
            OperationType::Transfer,
            BalanceRefs::transfer(&mut from.amount, &mut to.amount),
            &AmountChange::new(new_amount).with_old_amount(operation.amount),
        );
        ensure_applied(outcome, &from.balance_id)?;

        operation.amount = new_amount;
        operation.touch();
        from.touch();
        to.touch();
        writes::commit(
            &self.stores,
            &[
                LedgerWrite::UpdateOperation {
                    previous: op_before,
                    next: operation.clone(),
                },
                LedgerWrite::UpdateBalance {
                    previous: from_before,
                    next: from,
                },
                LedgerWrite::UpdateBalance {
                    previous: to_before,
                    next: to,
                },
            ],
        )
        .await?;
        Ok(operation)
    }

    async fn update_rated_transfer(
        &self,
        operation: Operation,
        new_amount: Amount,
    ) -> Result<Operation> {
        let (out, incoming) = self.transfer_pair(operation.clone()).await?;
        let _guard = self
            .locks
            .lock_pair(&out.balance_id, &incoming.balance_id)
            .await;
        let out_before = self.load_operation(&out.operation_id).await?;
        let incoming_before = self.load_operation(&incoming.operation_id).await?;
        let from_before = self.load_balance(&out_before.balance_id).await?;
        let to_before = self.load_balance(&incoming_before.balance_id).await?;
        let mut out = out_before.clone();
        let mut incoming = incoming_before.clone();
        let mut from = from_before.clone();
        let mut to = to_before.clone();

        let change = AmountChange::new(new_amount)
            .with_old_legs(out.amount, incoming.amount)
            .with_exchange_rate(out.exchange_rate.or(incoming.exchange_rate));
        let outcome = ledger::apply(
            LedgerAction::Update,
            operation.kind,
            BalanceRefs::transfer(&mut from.amount, &mut to.amount),
            &change,
        );
        let legs = match outcome {
            LedgerOutcome::Transfer(legs) => legs,
            _ => {
                return Err(EngineError::InvalidArgument(format!(
                    "cannot update transfer {} to {}",
                    operation.operation_id, new_amount
                )))
            }
        };

        out.amount = legs.transfer_out;
        incoming.amount = legs.transfer_in;
        out.touch();
        incoming.touch();
        from.touch();
        to.touch();
        writes::commit(
            &self.stores,
            &[
                LedgerWrite::UpdateOperation {
                    previous: out_before,
                    next: out.clone(),
                },
                LedgerWrite::UpdateOperation {
                    previous: incoming_before,
                    next: incoming.clone(),
                },
                LedgerWrite::UpdateBalance {
                    previous: from_before,
                    next: from,
                },
                LedgerWrite::UpdateBalance {
                    previous: to_before,
                    next: to,
                },
            ],
        )
        .await?;

        tracing::info!(
            sent = %legs.transfer_out.to_fixed(),
            received = %legs.transfer_in.to_fixed(),
            "transfer updated"
        );
        Ok(if operation.kind == OperationType::TransferIn {
            incoming
        } else {
            out
        })
    }

    /// Resolve both legs of a rated transfer as `(transfer_out, transfer_in)`.
    async fn transfer_pair(&self, operation: Operation) -> Result<(Operation, Operation)> {
        match operation.kind {
            OperationType::TransferIn => {
                let parent_id = operation.parent_operation_id.clone().ok_or_else(|| {
                    EngineError::InvalidArgument(format!(
                        "transfer_in {} has no parent operation",
                        operation.operation_id
                    ))
                })?;
                let out = self.load_operation(&parent_id).await?;
                Ok((out, operation))
            }
            _ => {
                let to_id = destination_of(&operation)?;
                let incoming = self
                    .stores
                    .operations
                    .list_operations(&to_id)
                    .await?
                    .into_iter()
                    .find(|op| {
                        op.parent_operation_id.as_deref() == Some(operation.operation_id.as_str())
                    })
                    .ok_or_else(|| {
                        EngineError::OperationNotFound(format!(
                            "transfer_in for {}",
                            operation.operation_id
                        ))
                    })?;
                Ok((operation, incoming))
            }
        }
    }

    async fn load_balance(&self, balance_id: &str) -> Result<Balance> {
        self.stores
            .balances
            .get_balance(balance_id)
            .await?
            .ok_or_else(|| EngineError::BalanceNotFound(balance_id.to_string()))
    }

    async fn load_operation(&self, operation_id: &str) -> Result<Operation> {
        self.stores
            .operations
            .get_operation(operation_id)
            .await?
            .ok_or_else(|| EngineError::OperationNotFound(operation_id.to_string()))
    }
}

fn require_positive(what: &str, value: &Amount) -> Result<()> {
    if value.is_positive() {
        Ok(())
    } else {
        Err(EngineError::InvalidArgument(format!(
            "{} must be positive, got {}",
            what, value
        )))
    }
}

fn ensure_applied(outcome: LedgerOutcome, balance_id: &str) -> Result<()> {
    if outcome.is_applied() {
        Ok(())
    } else {
        Err(EngineError::InvalidArgument(format!(
            "ledger update rejected for balance {}",
            balance_id
        )))
    }
}

fn destination_of(operation: &Operation) -> Result<String> {
    operation.transfer_balance_id.clone().ok_or_else(|| {
        EngineError::InvalidArgument(format!(
            "transfer {} has no destination balance",
            operation.operation_id
        ))
    })
}
