//! Transaction domain entity.
//! Framework-agnostic representation of one payment request issued against a service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Platform cut taken from every gross amount, in percent.
pub const PLATFORM_FEE_PERCENT: i64 = 5;

/// Internal transaction status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Overdue,
    Refunded,
    Disputed,
    Failed,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 6] = [
        TransactionStatus::Pending,
        TransactionStatus::Paid,
        TransactionStatus::Overdue,
        TransactionStatus::Refunded,
        TransactionStatus::Disputed,
        TransactionStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Paid => "paid",
            TransactionStatus::Overdue => "overdue",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::Disputed => "disputed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown transaction status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Splits a gross amount (minor units) into `(fee, net)`. The fee is floored.
pub fn split_fee(amount_cents: i64) -> (i64, i64) {
    let fee = amount_cents * PLATFORM_FEE_PERCENT / 100;
    (fee, amount_cents - fee)
}

/// Domain entity representing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_id: Option<Uuid>,
    pub external_reference: String,
    pub gateway_payment_id: Option<String>,
    pub amount_cents: i64,
    pub fee_cents: i64,
    pub net_cents: i64,
    pub status: TransactionStatus,
    pub payment_method: Option<String>,
    pub invoice_url: Option<String>,
    pub payer_name: Option<String>,
    pub payer_email: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates a pending transaction. Fee and net are fixed here and never recomputed.
    pub fn new_pending(user_id: Uuid, external_reference: impl Into<String>, amount_cents: i64) -> Self {
        let (fee_cents, net_cents) = split_fee(amount_cents);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            service_id: None,
            external_reference: external_reference.into(),
            gateway_payment_id: None,
            amount_cents,
            fee_cents,
            net_cents,
            status: TransactionStatus::Pending,
            payment_method: None,
            invoice_url: None,
            payer_name: None,
            payer_email: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_gateway_payment_id(mut self, gateway_payment_id: impl Into<String>) -> Self {
        self.gateway_payment_id = Some(gateway_payment_id.into());
        self
    }

    pub fn with_payer(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.payer_name = Some(name.into());
        self.payer_email = Some(email.into());
        self
    }

    /// Applies a reconciler update in place.
    ///
    /// Optional fields only overwrite when present and `paid_at` is never cleared,
    /// matching the `COALESCE` semantics of the Postgres store.
    pub fn apply(&mut self, update: &TransactionUpdate) {
        self.status = update.status;
        self.gateway_payment_id = Some(update.gateway_payment_id.clone());
        if let Some(method) = &update.payment_method {
            self.payment_method = Some(method.clone());
        }
        if let Some(url) = &update.invoice_url {
            self.invoice_url = Some(url.clone());
        }
        if let Some(paid_at) = update.paid_at {
            self.paid_at = Some(paid_at);
        }
        self.updated_at = update.updated_at;
    }

    pub fn fee_invariant_holds(&self) -> bool {
        self.net_cents == self.amount_cents - self.fee_cents
    }
}

/// The only mutation the webhook pipeline ever applies to a transaction.
/// Amount fields are deliberately absent.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionUpdate {
    pub status: TransactionStatus,
    pub gateway_payment_id: String,
    pub payment_method: Option<String>,
    pub invoice_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_is_five_percent_floored() {
        assert_eq!(split_fee(1000), (50, 950));
        assert_eq!(split_fee(999), (49, 950));
        assert_eq!(split_fee(19), (0, 19));
        assert_eq!(split_fee(0), (0, 0));
    }

    #[test]
    fn test_new_pending_sets_fee_and_net() {
        let tx = Transaction::new_pending(Uuid::new_v4(), "svc-42", 1000);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.fee_cents, 50);
        assert_eq!(tx.net_cents, 950);
        assert!(tx.fee_invariant_holds());
        assert!(tx.paid_at.is_none());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in TransactionStatus::ALL {
            assert_eq!(status.as_str().parse::<TransactionStatus>(), Ok(status));
        }
        assert!("PAID".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let value = serde_json::to_value(TransactionStatus::Disputed).unwrap();
        assert_eq!(value, "disputed");
    }

    #[test]
    fn test_apply_keeps_paid_at_and_amounts() {
        let mut tx = Transaction::new_pending(Uuid::new_v4(), "svc-1", 2000);
        let paid_at = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();

        tx.apply(&TransactionUpdate {
            status: TransactionStatus::Paid,
            gateway_payment_id: "pay_1".to_string(),
            payment_method: Some("pix".to_string()),
            invoice_url: None,
            paid_at: Some(paid_at),
            updated_at: Utc::now(),
        });
        tx.apply(&TransactionUpdate {
            status: TransactionStatus::Refunded,
            gateway_payment_id: "pay_1".to_string(),
            payment_method: None,
            invoice_url: None,
            paid_at: None,
            updated_at: Utc::now(),
        });

        assert_eq!(tx.status, TransactionStatus::Refunded);
        assert_eq!(tx.paid_at, Some(paid_at));
        assert_eq!(tx.payment_method.as_deref(), Some("pix"));
        assert_eq!((tx.amount_cents, tx.fee_cents, tx.net_cents), (2000, 100, 1900));
    }
}
