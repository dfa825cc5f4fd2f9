use crate::{Amount, BillingPeriod, EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fixed recurring charge against a balance.
///
/// The scheduler only reads subscriptions; they change through explicit
/// update flows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceSubscription {
    pub subscription_id: String,
    pub balance_id: String,
    pub category_id: String,
    pub name: String,
    pub amount: Amount,
    pub period: BillingPeriod,
    pub start_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BalanceSubscription {
    pub fn new(
        balance_id: String,
        category_id: String,
        name: String,
        amount: Amount,
        period: BillingPeriod,
    ) -> Self {
        let now = Utc::now();
        Self {
            subscription_id: crate::new_id("sub"),
            balance_id,
            category_id,
            name,
            amount,
            period,
            start_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_start_at(mut self, start_at: DateTime<Utc>) -> Self {
        self.start_at = start_at;
        self
    }

    pub fn with_id(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = subscription_id.into();
        self
    }

    /// Validate subscription data
    pub fn validate(&self) -> Result<()> {
        if self.subscription_id.is_empty() {
            return Err(EngineError::InvalidArgument(
                "Subscription ID cannot be empty".to_string(),
            ));
        }
        if self.balance_id.is_empty() || self.category_id.is_empty() {
            return Err(EngineError::InvalidArgument(
                "Subscription must reference a balance and a category".to_string(),
            ));
        }
        if !self.amount.is_positive() {
            return Err(EngineError::InvalidArgument(format!(
                "Subscription amount must be positive, got {}",
                self.amount
            )));
        }
        if !self.period.is_known() {
            return Err(EngineError::InvalidPeriod(self.period.to_string()));
        }
        Ok(())
    }

    /// Description used for operations materialized from this subscription.
    pub fn charge_description(&self) -> String {
        format!("Subscription payment: {}", self.name)
    }
}

/// A persisted timer entry: one row per future billing date.
///
/// Occurrences are only ever created or deleted, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledOccurrence {
    pub occurrence_id: String,
    pub subscription_id: String,
    pub scheduled_at: DateTime<Utc>,
}

impl ScheduledOccurrence {
    pub fn new(subscription_id: String, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            occurrence_id: crate::new_id("occ"),
            subscription_id,
            scheduled_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_subscription() -> BalanceSubscription {
        BalanceSubscription::new(
            "bal_1".to_string(),
            "cat_1".to_string(),
            "Music".to_string(),
            Amount::from(10),
            BillingPeriod::Monthly,
        )
    }

    #[test]
    fn test_subscription_validation() {
        let sub = test_subscription();
        assert!(sub.validate().is_ok());

        let mut zero = sub.clone();
        zero.amount = Amount::zero();
        assert!(matches!(
            zero.validate(),
            Err(EngineError::InvalidArgument(_))
        ));

        let mut unknown = sub.clone();
        unknown.period = BillingPeriod::Unknown;
        assert!(matches!(
            unknown.validate(),
            Err(EngineError::InvalidPeriod(_))
        ));

        let mut orphan = sub;
        orphan.balance_id = String::new();
        assert!(orphan.validate().is_err());
    }

    #[test]
    fn test_charge_description() {
        assert_eq!(
            test_subscription().charge_description(),
            "Subscription payment: Music"
        );
    }

    #[test]
    fn test_subscription_json_shape() {
        let sub = test_subscription().with_id("sub_music");
        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["period"], "monthly");
        assert_eq!(json["amount"], "10");

        let parsed: BalanceSubscription = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, sub);
    }
}
