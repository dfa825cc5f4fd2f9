//! Subscription commands

use anyhow::{anyhow, Result};
use budgetbot_engine::{Amount, BalanceSubscription, BillingPeriod, EngineError};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

use super::Engine;
use crate::ui;

/// Create a subscription and schedule its upcoming charges
#[tracing::instrument(skip(engine))]
pub async fn subscribe(
    engine: &Engine,
    balance_id: &str,
    category_id: &str,
    name: &str,
    amount: &str,
    period: &str,
    start: Option<&str>,
) -> Result<()> {
    let period: BillingPeriod = period.parse()?;
    let amount = Amount::parse(amount)?;

    // Both references must exist before anything is written.
    engine.ledger.balance(balance_id).await?;
    engine
        .stores
        .categories
        .get_category(category_id)
        .await?
        .ok_or_else(|| EngineError::CategoryNotFound(category_id.to_string()))?;

    let mut subscription = BalanceSubscription::new(
        balance_id.to_string(),
        category_id.to_string(),
        name.to_string(),
        amount,
        period,
    );
    if let Some(start) = start {
        subscription = subscription.with_start_at(parse_start(start)?);
    }
    subscription.validate()?;

    engine
        .stores
        .subscriptions
        .create_subscription(&subscription)
        .await?;
    let scheduled = engine
        .scheduler
        .schedule_occurrences(&subscription)
        .await?;

    ui::success(&format!(
        "Subscription created: {}",
        subscription.subscription_id
    ));
    ui::key_value("Name", &subscription.name);
    ui::key_value(
        "Charge",
        &format!("{} {}", subscription.amount.to_fixed(), subscription.period),
    );
    ui::info(&format!("{} upcoming charge(s) scheduled:", scheduled.len()));
    for occurrence in &scheduled {
        println!("    {}", local_time(&occurrence.scheduled_at));
    }
    Ok(())
}

/// List subscriptions with their pending charges
pub async fn list(engine: &Engine) -> Result<()> {
    let subscriptions = engine.stores.subscriptions.list_subscriptions().await?;

    ui::header("Subscriptions");
    if subscriptions.is_empty() {
        ui::info("No subscriptions found.");
        return Ok(());
    }

    for sub in &subscriptions {
        let pending = engine
            .stores
            .occurrences
            .list_occurrences_for_subscription(&sub.subscription_id)
            .await?;

        ui::separator();
        ui::key_value("ID", &sub.subscription_id);
        ui::key_value("Name", &sub.name);
        ui::key_value("Balance", &sub.balance_id);
        ui::key_value(
            "Charge",
            &format!("{} {}", sub.amount.to_fixed(), sub.period),
        );
        ui::key_value("Starts", &local_time(&sub.start_at));
        match pending.first() {
            Some(next) => ui::key_value(
                "Next charge",
                &format!("{} ({} pending)", local_time(&next.scheduled_at), pending.len()),
            ),
            None => ui::warning("  No pending charges"),
        }
    }
    ui::separator();
    Ok(())
}

/// Delete a subscription and its pending charges
#[tracing::instrument(skip(engine))]
pub async fn unsubscribe(engine: &Engine, subscription_id: &str) -> Result<()> {
    engine
        .stores
        .subscriptions
        .get_subscription(subscription_id)
        .await?
        .ok_or_else(|| EngineError::SubscriptionNotFound(subscription_id.to_string()))?;

    let removed = engine
        .scheduler
        .unschedule_subscription(subscription_id)
        .await?;
    engine
        .stores
        .subscriptions
        .delete_subscription(subscription_id)
        .await?;

    ui::success(&format!(
        "Subscription {} deleted ({} pending charge(s) cancelled)",
        subscription_id, removed
    ));
    Ok(())
}

/// Parse `YYYY-MM-DD` as local midnight, or an RFC 3339 timestamp.
fn parse_start(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(at.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| anyhow!("Invalid start date: {} (expected YYYY-MM-DD)", text))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("Invalid start date: {}", text))?;
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("Start date {} does not exist in the local timezone", text))
}

fn local_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
