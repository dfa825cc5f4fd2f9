//! Income, spending, transfer and operation history commands

use anyhow::Result;
use budgetbot_engine::{Amount, Operation};

use super::Engine;
use crate::ui;

/// Record money coming into a balance
pub async fn income(
    engine: &Engine,
    balance_id: &str,
    amount: &str,
    category: Option<&str>,
    description: &str,
) -> Result<()> {
    let op = engine
        .ledger
        .record_incoming(balance_id, Amount::parse(amount)?, category, description)
        .await?;
    ui::success(&format!("Income recorded: {}", op.operation_id));
    show_balance(engine, balance_id).await
}

/// Record money leaving a balance
pub async fn spend(
    engine: &Engine,
    balance_id: &str,
    amount: &str,
    category: Option<&str>,
    description: &str,
) -> Result<()> {
    let op = engine
        .ledger
        .record_spending(balance_id, Amount::parse(amount)?, category, description)
        .await?;
    ui::success(&format!("Spending recorded: {}", op.operation_id));
    show_balance(engine, balance_id).await
}

/// Move money between balances
pub async fn transfer(
    engine: &Engine,
    from: &str,
    to: &str,
    amount: &str,
    rate: Option<&str>,
    description: &str,
) -> Result<()> {
    let rate = rate.map(Amount::parse).transpose()?;
    let ops = engine
        .ledger
        .record_transfer(from, to, Amount::parse(amount)?, rate, description)
        .await?;

    for op in &ops {
        ui::success(&format!("{} recorded: {}", op.kind, op.operation_id));
    }
    show_balance(engine, from).await?;
    show_balance(engine, to).await
}

/// Change the amount of a recorded operation
pub async fn edit(engine: &Engine, operation_id: &str, amount: &str) -> Result<()> {
    let op = engine
        .ledger
        .update_operation_amount(operation_id, Amount::parse(amount)?)
        .await?;
    ui::success(&format!(
        "Operation {} now {}",
        op.operation_id,
        op.amount.to_fixed()
    ));
    show_balance(engine, &op.balance_id).await
}

/// Show the operation history of a balance
pub async fn list(engine: &Engine, balance_id: &str, json: bool) -> Result<()> {
    let balance = engine.ledger.balance(balance_id).await?;
    let operations = engine.ledger.operations(balance_id).await?;

    if json {
        ui::json(&serde_json::to_value(&operations)?);
        return Ok(());
    }

    ui::header(&format!("Operations on {}", balance.name));
    if operations.is_empty() {
        ui::info("No operations recorded.");
        return Ok(());
    }
    for op in &operations {
        print_operation(op, &balance.currency);
    }
    ui::separator();
    ui::key_value("Balance", &ui::money(&balance.amount, &balance.currency));
    Ok(())
}

fn print_operation(op: &Operation, currency: &str) {
    ui::separator();
    ui::key_value("ID", &op.operation_id);
    ui::key_value("Date", &op.created_at.format("%Y-%m-%d %H:%M").to_string());
    ui::key_value("Type", &op.kind.to_string());
    ui::key_value("Amount", &format!("{} {}", op.amount.to_fixed(), currency));
    if let Some(rate) = &op.exchange_rate {
        ui::key_value("Rate", &rate.to_string());
    }
    if let Some(other) = &op.transfer_balance_id {
        ui::key_value("Counterpart", other);
    }
    if let Some(parent) = &op.parent_operation_id {
        ui::key_value("Linked to", parent);
    }
    if !op.description.is_empty() {
        ui::key_value("Description", &op.description);
    }
}

async fn show_balance(engine: &Engine, balance_id: &str) -> Result<()> {
    let balance = engine.ledger.balance(balance_id).await?;
    ui::key_value(
        &balance.name,
        &ui::money(&balance.amount, &balance.currency),
    );
    Ok(())
}
