use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ports::{NotificationDispatcher, NotificationError, PaymentNotifier};

pub const DEFAULT_NOTIFICATION_FUNCTION: &str = "send-payment-notification";

/// Invokes the platform's payment notification function by name.
#[derive(Clone)]
pub struct PlatformFunctionNotifier {
    client: Client,
    base_url: String,
    service_key: String,
    function_name: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl PlatformFunctionNotifier {
    pub fn new(base_url: String, service_key: String, function_name: String) -> Self {
        Self::with_circuit_breaker(base_url, service_key, function_name, 3, 60)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        service_key: String,
        function_name: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            client,
            base_url,
            service_key,
            function_name,
            circuit_breaker,
        }
    }

    pub fn function_url(&self) -> String {
        format!(
            "{}/functions/v1/{}",
            self.base_url.trim_end_matches('/'),
            self.function_name
        )
    }

    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }
}

#[async_trait]
impl PaymentNotifier for PlatformFunctionNotifier {
    async fn notify_payment(&self, transaction_id: Uuid) -> Result<(), NotificationError> {
        let request = self
            .client
            .post(self.function_url())
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&json!({ "transactionId": transaction_id }));

        let result = self
            .circuit_breaker
            .call(async move {
                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(NotificationError::Rejected {
                        status: status.as_u16(),
                        body,
                    });
                }
                Ok(())
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(FailsafeError::Rejected) => Err(NotificationError::CircuitBreakerOpen(
                "notification function circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

/// Bounded hand-off between the webhook path and the notification worker.
///
/// `dispatch` never waits: a full or closed queue drops the id with a warning.
/// Failures are only visible in logs, never in the webhook response.
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<Uuid>,
}

impl NotificationQueue {
    pub fn spawn(notifier: Arc<dyn PaymentNotifier>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_notification_worker(receiver, notifier));
        (Self { sender }, handle)
    }
}

impl NotificationDispatcher for NotificationQueue {
    fn dispatch(&self, transaction_id: Uuid) {
        match self.sender.try_send(transaction_id) {
            Ok(()) => info!(%transaction_id, "Payment notification queued"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%transaction_id, "Notification queue full, dropping notification")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(%transaction_id, "Notification worker stopped, dropping notification")
            }
        }
    }
}

/// Drains the queue until every sender is dropped.
pub async fn run_notification_worker(mut receiver: mpsc::Receiver<Uuid>, notifier: Arc<dyn PaymentNotifier>) {
    info!("Notification worker started");

    while let Some(transaction_id) = receiver.recv().await {
        match notifier.notify_payment(transaction_id).await {
            Ok(()) => info!(%transaction_id, "Payment notification sent"),
            Err(e) => error!(%transaction_id, error = %e, "Failed to send payment notification"),
        }
    }

    info!("Notification worker stopped");
}
