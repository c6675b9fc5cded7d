pub mod transaction;
pub mod webhook;

pub use transaction::{split_fee, Transaction, TransactionStatus, TransactionUpdate};
pub use webhook::{
    DeliveryNote, GatewayPayment, GatewayWebhook, LookupKey, WebhookDelivery, WebhookLogUpdate,
};
