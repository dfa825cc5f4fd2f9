//! Balance arithmetic for creating and updating operations.
//!
//! The calculator is a pure function of its inputs: it takes mutable
//! references to the balance amounts involved, the operation amounts, and
//! moves the balances forward in place. It never touches storage.
//!
//! | Action | Type | Rule |
//! |---|---|---|
//! | create | incoming | balance += amount |
//! | create | spending | balance -= amount |
//! | create | transfer | from -= out; to += out × rate |
//! | update | incoming | balance -= old; balance += new |
//! | update | spending | balance += old; balance -= new |
//! | update | transfer / transfer_out | reverse old legs; from -= new; to += new × rate |
//! | update | transfer_in | reverse old legs; from -= new ÷ rate; to += new |
//!
//! A missing rate means 1. When a reference or amount that the rule needs
//! is absent, or the arithmetic overflows or divides by zero, nothing is
//! mutated and [`LedgerOutcome::Skipped`] is returned.

use crate::{Amount, OperationType};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAction {
    Create,
    Update,
}

/// Mutable balance amounts touched by an operation.
///
/// Incoming/spending use `balance`; transfers use `from` and `to`.
#[derive(Debug, Default)]
pub struct BalanceRefs<'a> {
    pub balance: Option<&'a mut Amount>,
    pub from: Option<&'a mut Amount>,
    pub to: Option<&'a mut Amount>,
}

impl<'a> BalanceRefs<'a> {
    pub fn single(balance: &'a mut Amount) -> Self {
        Self {
            balance: Some(balance),
            ..Self::default()
        }
    }

    pub fn transfer(from: &'a mut Amount, to: &'a mut Amount) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }
}

/// Operation amounts fed into the calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountChange {
    /// New operation amount. For `transfer_in` this is the received leg,
    /// otherwise the sent/charged amount.
    pub amount: Amount,
    /// Previous amount of an incoming/spending/transfer operation.
    pub old_amount: Option<Amount>,
    /// Previous sent leg of a transfer pair.
    pub old_transfer_out: Option<Amount>,
    /// Previous received leg of a transfer pair.
    pub old_transfer_in: Option<Amount>,
    pub exchange_rate: Option<Amount>,
}

impl AmountChange {
    pub fn new(amount: Amount) -> Self {
        Self {
            amount,
            old_amount: None,
            old_transfer_out: None,
            old_transfer_in: None,
            exchange_rate: None,
        }
    }

    pub fn with_old_amount(mut self, old: Amount) -> Self {
        self.old_amount = Some(old);
        self
    }

    pub fn with_old_legs(mut self, transfer_out: Amount, transfer_in: Amount) -> Self {
        self.old_transfer_out = Some(transfer_out);
        self.old_transfer_in = Some(transfer_in);
        self
    }

    pub fn with_exchange_rate(mut self, rate: Option<Amount>) -> Self {
        self.exchange_rate = rate;
        self
    }

    fn rate(&self) -> Amount {
        self.exchange_rate
            .unwrap_or_else(|| Amount::new(Decimal::ONE))
    }
}

/// Amounts on both sides of a transfer after the calculator ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLegs {
    pub transfer_out: Amount,
    pub transfer_in: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// Inputs were incomplete or the arithmetic failed; nothing changed.
    Skipped,
    /// An incoming/spending balance was updated.
    Applied,
    /// Both transfer balances were updated with these legs.
    Transfer(TransferLegs),
}

impl LedgerOutcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self, LedgerOutcome::Skipped)
    }
}

/// Apply `change` to the balances for the given action and operation type.
///
/// # Examples
///
/// ```rust
/// use budgetbot_engine::ledger::{apply, AmountChange, BalanceRefs, LedgerAction};
/// use budgetbot_engine::{Amount, OperationType};
///
/// let mut balance = Amount::from(100);
/// apply(
///     LedgerAction::Create,
///     OperationType::Spending,
///     BalanceRefs::single(&mut balance),
///     &AmountChange::new(Amount::from(30)),
/// );
/// assert_eq!(balance.to_fixed(), "70.00");
/// ```
pub fn apply(
    action: LedgerAction,
    kind: OperationType,
    refs: BalanceRefs<'_>,
    change: &AmountChange,
) -> LedgerOutcome {
    match kind {
        OperationType::Incoming | OperationType::Spending => match refs.balance {
            Some(balance) => apply_single(action, kind, balance, change),
            None => LedgerOutcome::Skipped,
        },
        OperationType::Transfer | OperationType::TransferIn | OperationType::TransferOut => {
            match (refs.from, refs.to) {
                (Some(from), Some(to)) => apply_transfer(action, kind, from, to, change),
                _ => LedgerOutcome::Skipped,
            }
        }
    }
}

fn apply_single(
    action: LedgerAction,
    kind: OperationType,
    balance: &mut Amount,
    change: &AmountChange,
) -> LedgerOutcome {
    let current = *balance;
    let next = match (action, kind) {
        (LedgerAction::Create, OperationType::Incoming) => current.checked_add(&change.amount),
        (LedgerAction::Create, _) => current.checked_sub(&change.amount),
        (LedgerAction::Update, OperationType::Incoming) => change.old_amount.and_then(|old| {
            current
                .checked_sub(&old)
                .and_then(|v| v.checked_add(&change.amount))
        }),
        (LedgerAction::Update, _) => change.old_amount.and_then(|old| {
            current
                .checked_add(&old)
                .and_then(|v| v.checked_sub(&change.amount))
        }),
    };

    match next {
        Some(value) => {
            *balance = value;
            LedgerOutcome::Applied
        }
        None => LedgerOutcome::Skipped,
    }
}

fn apply_transfer(
    action: LedgerAction,
    kind: OperationType,
    from: &mut Amount,
    to: &mut Amount,
    change: &AmountChange,
) -> LedgerOutcome {
    let Some(legs) = new_legs(kind, change) else {
        return LedgerOutcome::Skipped;
    };

    // Undo the previous legs first so the new ones apply to a clean slate.
    let (base_from, base_to) = match action {
        LedgerAction::Create => (*from, *to),
        LedgerAction::Update => {
            let old_out = change.old_transfer_out.or(change.old_amount);
            let old_in = change.old_transfer_in.or(change.old_amount);
            let (Some(old_out), Some(old_in)) = (old_out, old_in) else {
                return LedgerOutcome::Skipped;
            };
            match (from.checked_add(&old_out), to.checked_sub(&old_in)) {
                (Some(f), Some(t)) => (f, t),
                _ => return LedgerOutcome::Skipped,
            }
        }
    };

    match (
        base_from.checked_sub(&legs.transfer_out),
        base_to.checked_add(&legs.transfer_in),
    ) {
        (Some(next_from), Some(next_to)) => {
            *from = next_from;
            *to = next_to;
            LedgerOutcome::Transfer(legs)
        }
        _ => LedgerOutcome::Skipped,
    }
}

/// Derive both legs from the new amount: `transfer_in` amounts are the
/// received side, every other transfer kind carries the sent side.
fn new_legs(kind: OperationType, change: &AmountChange) -> Option<TransferLegs> {
    let rate = change.rate();
    match kind {
        OperationType::TransferIn => Some(TransferLegs {
            transfer_out: change.amount.checked_div(&rate)?,
            transfer_in: change.amount,
        }),
        _ => Some(TransferLegs {
            transfer_out: change.amount,
            transfer_in: change.amount.checked_mul(&rate)?,
        }),
    }
}
