pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod startup;
pub mod use_cases;
pub mod utils;

use axum::{
    http::{header, HeaderName, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::middleware::request_logger::{request_logger_middleware, RequestLogConfig};
use crate::middleware::webhook_auth::{webhook_auth, WebhookAuthenticator};
use crate::ports::{NotificationDispatcher, TransactionStore, WebhookLogStore};
use crate::services::reconciler::Reconciler;
use crate::services::status_mapper::StatusMapper;
use crate::use_cases::process_webhook::ProcessWebhook;

#[derive(Clone)]
pub struct AppState {
    pub transactions: Arc<dyn TransactionStore>,
    pub webhook_logs: Arc<dyn WebhookLogStore>,
    pub process_webhook: Arc<ProcessWebhook>,
    pub authenticator: Arc<WebhookAuthenticator>,
    pub request_log: RequestLogConfig,
}

impl AppState {
    /// Wires the pipeline from its ports.
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        webhook_logs: Arc<dyn WebhookLogStore>,
        mapper: StatusMapper,
        notifier: Arc<dyn NotificationDispatcher>,
        authenticator: WebhookAuthenticator,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(
            transactions.clone(),
            webhook_logs.clone(),
            mapper,
            notifier,
        ));
        let process_webhook = Arc::new(ProcessWebhook::new(webhook_logs.clone(), reconciler));

        Self {
            transactions,
            webhook_logs,
            process_webhook,
            authenticator: Arc::new(authenticator),
            request_log: RequestLogConfig::default(),
        }
    }

    pub fn with_request_log(mut self, request_log: RequestLogConfig) -> Self {
        self.request_log = request_log;
        self
    }
}

pub fn create_app(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route("/webhooks/asaas", post(handlers::webhook::asaas_webhook))
        .route_layer(from_fn_with_state(state.authenticator.clone(), webhook_auth));

    let mut allowed_headers = vec![
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        HeaderName::from_static("apikey"),
        HeaderName::from_static("x-client-info"),
    ];
    allowed_headers.extend(
        state
            .authenticator
            .header_names()
            .into_iter()
            .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok()),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(allowed_headers);

    let request_log = state.request_log;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/transactions/:id", get(handlers::webhook::get_transaction))
        .merge(webhook_routes)
        .with_state(state)
        .layer(from_fn_with_state(request_log, request_logger_middleware))
        .layer(cors)
}
