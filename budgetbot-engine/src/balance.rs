use crate::{Amount, EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's account balance in a single currency.
///
/// `amount` is the already-settled value; the ledger calculator moves it
/// forward by deltas and never re-derives it from the operation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Balance {
    pub balance_id: String,
    pub user_id: String,
    pub currency: String,
    pub name: String,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    pub fn new(user_id: String, name: String, currency: String, amount: Amount) -> Self {
        let now = Utc::now();
        Self {
            balance_id: crate::new_id("bal"),
            user_id,
            currency,
            name,
            amount,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, balance_id: impl Into<String>) -> Self {
        self.balance_id = balance_id.into();
        self
    }

    /// Stamp `updated_at` after an amount change.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn validate(&self) -> Result<()> {
        if self.balance_id.is_empty() {
            return Err(EngineError::InvalidArgument(
                "Balance ID cannot be empty".to_string(),
            ));
        }
        if self.currency.is_empty() {
            return Err(EngineError::InvalidArgument(
                "Currency cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Spending/income category attached to operations and subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub category_id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(user_id: String, name: String) -> Self {
        Self {
            category_id: crate::new_id("cat"),
            user_id,
            name,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = category_id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_creation() {
        let balance = Balance::new(
            "user_1".to_string(),
            "Wallet".to_string(),
            "EUR".to_string(),
            Amount::from(100),
        );
        assert!(balance.balance_id.starts_with("bal_"));
        assert_eq!(balance.created_at, balance.updated_at);
        assert!(balance.validate().is_ok());

        let mut invalid = balance.clone();
        invalid.currency = String::new();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_balance_amount_persists_as_string() {
        let balance = Balance::new(
            "user_1".to_string(),
            "Card".to_string(),
            "USD".to_string(),
            Amount::parse("10.10").unwrap(),
        )
        .with_id("bal_card");
        let json = serde_json::to_value(&balance).unwrap();
        assert_eq!(json["amount"], "10.10");
        assert_eq!(json["balance_id"], "bal_card");
    }
}
