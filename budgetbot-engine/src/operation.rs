use crate::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Incoming,
    Spending,
    /// Same-currency transfer stored as one record on the source balance.
    Transfer,
    /// Destination leg of a cross-currency transfer.
    TransferIn,
    /// Source leg of a cross-currency transfer.
    TransferOut,
}

impl OperationType {
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            OperationType::Transfer | OperationType::TransferIn | OperationType::TransferOut
        )
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationType::Incoming => "incoming",
            OperationType::Spending => "spending",
            OperationType::Transfer => "transfer",
            OperationType::TransferIn => "transfer_in",
            OperationType::TransferOut => "transfer_out",
        };
        f.write_str(name)
    }
}

/// A ledger entry against one balance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub operation_id: String,
    pub balance_id: String,
    pub category_id: Option<String>,
    /// For `transfer_in`: the matching `transfer_out` operation.
    pub parent_operation_id: Option<String>,
    /// For `transfer` and `transfer_out`: the destination balance.
    pub transfer_balance_id: Option<String>,
    pub subscription_id: Option<String>,
    /// Occurrence this operation was materialized from, if any.
    pub occurrence_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: OperationType,
    pub amount: Amount,
    pub exchange_rate: Option<Amount>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Operation {
    pub fn new(balance_id: String, kind: OperationType, amount: Amount, description: String) -> Self {
        let now = Utc::now();
        Self {
            operation_id: crate::new_id("op"),
            balance_id,
            category_id: None,
            parent_operation_id: None,
            transfer_balance_id: None,
            subscription_id: None,
            occurrence_id: None,
            kind,
            amount,
            exchange_rate: None,
            description,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_category(mut self, category_id: Option<String>) -> Self {
        self.category_id = category_id;
        self
    }

    pub fn with_parent(mut self, parent_operation_id: String) -> Self {
        self.parent_operation_id = Some(parent_operation_id);
        self
    }

    pub fn with_transfer_balance(mut self, balance_id: String) -> Self {
        self.transfer_balance_id = Some(balance_id);
        self
    }

    pub fn with_exchange_rate(mut self, rate: Option<Amount>) -> Self {
        self.exchange_rate = rate;
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Link the operation to the subscription occurrence that produced it.
    pub fn with_occurrence(mut self, subscription_id: String, occurrence_id: String) -> Self {
        self.subscription_id = Some(subscription_id);
        self.occurrence_id = Some(occurrence_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_type_serde() {
        let json = serde_json::to_string(&OperationType::TransferOut).unwrap();
        assert_eq!(json, "\"transfer_out\"");
        let parsed: OperationType = serde_json::from_str("\"spending\"").unwrap();
        assert_eq!(parsed, OperationType::Spending);
        assert_eq!(OperationType::TransferIn.to_string(), "transfer_in");
    }

    #[test]
    fn test_operation_builder() {
        let op = Operation::new(
            "bal_1".to_string(),
            OperationType::Spending,
            Amount::from(20),
            "Netflix".to_string(),
        )
        .with_category(Some("cat_1".to_string()))
        .with_occurrence("sub_1".to_string(), "occ_1".to_string());

        assert!(op.operation_id.starts_with("op_"));
        assert_eq!(op.occurrence_id.as_deref(), Some("occ_1"));
        assert!(!op.kind.is_transfer());

        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "spending");
        assert_eq!(json["amount"], "20");
    }
}
