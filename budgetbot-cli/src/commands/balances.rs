//! Balance and category commands

use anyhow::Result;
use budgetbot_engine::Amount;

use super::Engine;
use crate::ui;

/// Create a balance
#[tracing::instrument(skip(engine))]
pub async fn add(
    engine: &Engine,
    user: &str,
    name: &str,
    currency: &str,
    initial: Option<&str>,
) -> Result<()> {
    let initial = match initial {
        Some(text) => Amount::parse(text)?,
        None => Amount::zero(),
    };
    let balance = engine
        .ledger
        .create_balance(user, name, currency, initial)
        .await?;

    ui::success(&format!("Balance created: {}", balance.balance_id));
    ui::key_value("Name", &balance.name);
    ui::key_value("Amount", &ui::money(&balance.amount, &balance.currency));
    Ok(())
}

/// List balances
pub async fn list(engine: &Engine) -> Result<()> {
    let balances = engine.ledger.balances().await?;

    ui::header("Balances");
    if balances.is_empty() {
        ui::info("No balances yet. Create one with 'budgetbot balance-add'.");
        return Ok(());
    }

    for balance in &balances {
        ui::separator();
        ui::key_value("ID", &balance.balance_id);
        ui::key_value("Name", &balance.name);
        ui::key_value("Owner", &balance.user_id);
        ui::key_value("Amount", &ui::money(&balance.amount, &balance.currency));
    }
    ui::separator();
    ui::info(&format!("{} balance(s)", balances.len()));
    Ok(())
}

/// Create a category
pub async fn add_category(engine: &Engine, user: &str, name: &str) -> Result<()> {
    let category = engine.ledger.create_category(user, name).await?;
    ui::success(&format!(
        "Category '{}' created: {}",
        category.name, category.category_id
    ));
    Ok(())
}

/// List categories
pub async fn list_categories(engine: &Engine) -> Result<()> {
    let categories = engine.ledger.categories().await?;

    ui::header("Categories");
    if categories.is_empty() {
        ui::info("No categories yet. Create one with 'budgetbot category-add'.");
        return Ok(());
    }
    for category in categories {
        ui::key_value(&category.name, &category.category_id);
    }
    Ok(())
}
