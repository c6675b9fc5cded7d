//! Inbound gateway payloads and the webhook delivery audit record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type recorded for bodies that are not valid JSON.
pub const UNPARSEABLE_EVENT: &str = "UNPARSEABLE";

/// Top-level webhook body as posted by the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayWebhook {
    pub event: String,
    #[serde(default)]
    pub payment: Option<GatewayPayment>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPayment {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub billing_type: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub net_value: Option<f64>,
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub invoice_url: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub confirmed_date: Option<String>,
    #[serde(default)]
    pub payment_date: Option<String>,
}

/// Which key the reconciler uses to find the local transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey<'a> {
    ExternalReference(&'a str),
    GatewayPaymentId(&'a str),
}

impl GatewayPayment {
    pub fn lookup_key(&self) -> LookupKey<'_> {
        match self.external_reference.as_deref() {
            Some(reference) if !reference.is_empty() => LookupKey::ExternalReference(reference),
            _ => LookupKey::GatewayPaymentId(&self.id),
        }
    }

    pub fn payment_method(&self) -> Option<String> {
        self.billing_type.as_deref().map(str::to_lowercase)
    }

    /// Confirmation date, falling back to the payment date.
    pub fn settlement_date(&self) -> Option<DateTime<Utc>> {
        let raw = self
            .confirmed_date
            .as_deref()
            .or(self.payment_date.as_deref())?;

        let parsed = parse_gateway_date(raw);
        if parsed.is_none() {
            tracing::warn!(payment_id = %self.id, date = %raw, "Unparseable settlement date, ignoring");
        }
        parsed
    }
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_gateway_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Marker stored on deliveries that did not lead to a transaction update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryNote {
    TransactionNotFound,
    NoPayment,
    UnparseablePayload,
    /// Replay skipped because the transaction changed after this delivery arrived.
    Superseded,
}

impl DeliveryNote {
    /// Notes that replay never picks up again.
    pub const TERMINAL: [DeliveryNote; 3] = [
        DeliveryNote::NoPayment,
        DeliveryNote::UnparseablePayload,
        DeliveryNote::Superseded,
    ];

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryNote::TransactionNotFound)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryNote::TransactionNotFound => "transaction_not_found",
            DeliveryNote::NoPayment => "no_payment",
            DeliveryNote::UnparseablePayload => "unparseable_payload",
            DeliveryNote::Superseded => "superseded",
        }
    }
}

/// Append-only audit record of one received webhook call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    pub processed: bool,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookDelivery {
    /// Records a parsed delivery. The idempotency key is the gateway payment id,
    /// or a fresh UUID when the body carries no payment.
    pub fn received(webhook: &GatewayWebhook, payload: serde_json::Value) -> Self {
        let idempotency_key = webhook
            .payment
            .as_ref()
            .map(|p| p.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            id: Uuid::new_v4(),
            event_type: webhook.event.clone(),
            payload,
            idempotency_key,
            processed: false,
            note: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    /// Records a body that could not be parsed, preserving it verbatim as a JSON string.
    pub fn unparseable(raw: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: UNPARSEABLE_EVENT.to_string(),
            payload: serde_json::Value::String(raw.to_string()),
            idempotency_key: Uuid::new_v4().to_string(),
            processed: false,
            note: Some(DeliveryNote::UnparseablePayload.as_str().to_string()),
            created_at: Utc::now(),
            processed_at: None,
        }
    }
}

/// Patch applied to a delivery once processing finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookLogUpdate {
    pub processed: bool,
    pub note: Option<DeliveryNote>,
}

impl WebhookLogUpdate {
    pub fn processed() -> Self {
        Self { processed: true, note: None }
    }

    pub fn unprocessed(note: DeliveryNote) -> Self {
        Self { processed: false, note: Some(note) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payment(value: serde_json::Value) -> GatewayPayment {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_deserialize_camel_case_payload() {
        let webhook: GatewayWebhook = serde_json::from_value(json!({
            "event": "PAYMENT_CONFIRMED",
            "payment": {
                "id": "pay_1",
                "customer": "cus_1",
                "billingType": "PIX",
                "value": 10.0,
                "netValue": 9.5,
                "status": "CONFIRMED",
                "externalReference": "svc-42",
                "confirmedDate": "2024-01-01T00:00:00Z"
            }
        }))
        .unwrap();

        let payment = webhook.payment.unwrap();
        assert_eq!(payment.external_reference.as_deref(), Some("svc-42"));
        assert_eq!(payment.payment_method().as_deref(), Some("pix"));
    }

    #[test]
    fn test_lookup_key_falls_back_to_payment_id() {
        let with_ref = payment(json!({"id": "pay_1", "status": "PENDING", "externalReference": "svc-1"}));
        assert_eq!(with_ref.lookup_key(), LookupKey::ExternalReference("svc-1"));

        let empty_ref = payment(json!({"id": "pay_2", "status": "PENDING", "externalReference": ""}));
        assert_eq!(empty_ref.lookup_key(), LookupKey::GatewayPaymentId("pay_2"));

        let no_ref = payment(json!({"id": "pay_3", "status": "PENDING"}));
        assert_eq!(no_ref.lookup_key(), LookupKey::GatewayPaymentId("pay_3"));
    }

    #[test]
    fn test_settlement_date_prefers_confirmed_date() {
        let p = payment(json!({
            "id": "pay_1",
            "status": "RECEIVED",
            "confirmedDate": "2024-02-03",
            "paymentDate": "2024-02-05"
        }));
        assert_eq!(
            p.settlement_date(),
            Some("2024-02-03T00:00:00Z".parse::<DateTime<Utc>>().unwrap())
        );
    }

    #[test]
    fn test_settlement_date_garbage_is_none() {
        let p = payment(json!({"id": "pay_1", "status": "RECEIVED", "paymentDate": "yesterday"}));
        assert_eq!(p.settlement_date(), None);
    }

    #[test]
    fn test_idempotency_key_without_payment_is_fresh() {
        let webhook = GatewayWebhook { event: "ACCOUNT_UPDATED".to_string(), payment: None };
        let a = WebhookDelivery::received(&webhook, json!({}));
        let b = WebhookDelivery::received(&webhook, json!({}));
        assert_ne!(a.idempotency_key, b.idempotency_key);
        assert!(!a.processed);
    }

    #[test]
    fn test_only_transaction_not_found_is_retryable() {
        assert!(!DeliveryNote::TransactionNotFound.is_terminal());
        assert!(DeliveryNote::TERMINAL.iter().all(DeliveryNote::is_terminal));
        assert!(!DeliveryNote::TERMINAL.contains(&DeliveryNote::TransactionNotFound));
    }
}
