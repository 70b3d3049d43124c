//! Payment aggregate and its status machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::money::Currency;

/// Lifecycle states of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
        }
    }

    /// The status-transition table.
    ///
    /// Enforced wherever a status change is applied outside the charge saga
    /// (reconciliation, refund propagation). Self-transitions are invalid;
    /// `failed` and `refunded` are terminal.
    pub fn can_transition_to(&self, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Refunded)
                | (Completed, PartiallyRefunded)
                | (PartiallyRefunded, Refunded)
        )
    }

    /// States from which a refund may be created.
    pub fn is_refundable(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::PartiallyRefunded
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "partially_refunded" => Ok(PaymentStatus::PartiallyRefunded),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// A request to move money through a provider. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    /// Merchant-supplied identifier, unique per merchant when set.
    pub external_id: Option<String>,
    pub merchant_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub provider: String,
    pub provider_transaction_id: Option<String>,
    pub description: Option<String>,
    pub metadata: Value,
    pub webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only step log entry for a payment: one row per status transition
/// or provider interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub provider_response: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::PaymentStatus::*;

    #[test]
    fn test_forward_transitions() {
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Refunded));
        assert!(Completed.can_transition_to(PartiallyRefunded));
        assert!(PartiallyRefunded.can_transition_to(Refunded));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!Pending.can_transition_to(Refunded));
        assert!(!Pending.can_transition_to(PartiallyRefunded));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Refunded.can_transition_to(PartiallyRefunded));
        assert!(!PartiallyRefunded.can_transition_to(Completed));
    }

    #[test]
    fn test_no_self_transitions() {
        for status in [
            Pending,
            Processing,
            Completed,
            Failed,
            Refunded,
            PartiallyRefunded,
        ] {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_refundable_states() {
        assert!(Completed.is_refundable());
        assert!(PartiallyRefunded.is_refundable());
        assert!(!Pending.is_refundable());
        assert!(!Failed.is_refundable());
        assert!(!Refunded.is_refundable());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            Pending,
            Processing,
            Completed,
            Failed,
            Refunded,
            PartiallyRefunded,
        ] {
            assert_eq!(status.as_str().parse::<super::PaymentStatus>(), Ok(status));
        }
    }
}
