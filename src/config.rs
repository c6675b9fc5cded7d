use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::middleware::webhook_auth::{
    WebhookAuthenticator, DEFAULT_SIGNATURE_HEADER, DEFAULT_TOKEN_HEADER,
};
use crate::services::notification::DEFAULT_NOTIFICATION_FUNCTION;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub platform_url: String,
    pub platform_service_key: String,
    pub gateway_api_key: Option<String>,
    pub webhook_token: Option<String>,
    pub webhook_token_header: String,
    pub webhook_signature_secret: Option<String>,
    pub webhook_signature_header: String,
    pub status_map_path: Option<PathBuf>,
    pub notification_function: String,
    pub notification_queue_capacity: usize,
    pub log_request_body: bool,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            platform_url: env::var("SUPABASE_URL")?,
            platform_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY")?,
            gateway_api_key: non_empty_var("ASAAS_API_KEY"),
            webhook_token: non_empty_var("ASAAS_WEBHOOK_TOKEN"),
            webhook_token_header: env::var("WEBHOOK_TOKEN_HEADER")
                .unwrap_or_else(|_| DEFAULT_TOKEN_HEADER.to_string()),
            webhook_signature_secret: non_empty_var("WEBHOOK_SIGNATURE_SECRET"),
            webhook_signature_header: env::var("WEBHOOK_SIGNATURE_HEADER")
                .unwrap_or_else(|_| DEFAULT_SIGNATURE_HEADER.to_string()),
            status_map_path: non_empty_var("STATUS_MAP_PATH").map(PathBuf::from),
            notification_function: env::var("NOTIFICATION_FUNCTION")
                .unwrap_or_else(|_| DEFAULT_NOTIFICATION_FUNCTION.to_string()),
            notification_queue_capacity: env::var("NOTIFICATION_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()?,
            log_request_body: parse_bool(env::var("LOG_REQUEST_BODY").ok().as_deref()),
            log_format: parse_log_format(env::var("LOG_FORMAT").ok().as_deref()),
        })
    }

    pub fn webhook_authenticator(&self) -> WebhookAuthenticator {
        let mut authenticator = WebhookAuthenticator::permissive();
        if let Some(token) = &self.webhook_token {
            authenticator = authenticator.with_token(&self.webhook_token_header, token);
        }
        if let Some(secret) = &self.webhook_signature_secret {
            authenticator = authenticator.with_signature(&self.webhook_signature_header, secret);
        }
        authenticator
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(raw: Option<&str>) -> bool {
    matches!(raw.map(str::trim), Some("1") | Some("true") | Some("TRUE") | Some("yes"))
}

fn parse_log_format(raw: Option<&str>) -> LogFormat {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        server_port: 3000,
        database_url: "postgres://localhost:5432/viveo".to_string(),
        platform_url: "https://project.supabase.co".to_string(),
        platform_service_key: "service-key".to_string(),
        gateway_api_key: None,
        webhook_token: None,
        webhook_token_header: DEFAULT_TOKEN_HEADER.to_string(),
        webhook_signature_secret: None,
        webhook_signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
        status_map_path: None,
        notification_function: DEFAULT_NOTIFICATION_FUNCTION.to_string(),
        notification_queue_capacity: 256,
        log_request_body: false,
        log_format: LogFormat::Pretty,
    }
}
