pub mod process_webhook;

pub use process_webhook::{ProcessWebhook, WebhookOutcome};
