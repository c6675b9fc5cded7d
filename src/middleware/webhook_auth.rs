//! Gateway webhook authentication.
//!
//! Token mode compares a pre-shared header value in constant time. Signature
//! mode verifies a hex HMAC-SHA256 of the raw body. With neither configured the
//! check is skipped entirely, which is a deployment risk logged at startup.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOKEN_HEADER: &str = "asaas-access-token";
pub const DEFAULT_SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Upper bound on buffered webhook bodies.
const MAX_WEBHOOK_BODY: usize = 1024 * 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing {0} header")]
    MissingHeader(String),

    #[error("invalid webhook token")]
    InvalidToken,

    #[error("invalid webhook signature")]
    InvalidSignature,
}

#[derive(Clone)]
struct TokenCheck {
    header: String,
    expected: String,
}

#[derive(Clone)]
struct SignatureCheck {
    header: String,
    secret: String,
}

#[derive(Clone, Default)]
pub struct WebhookAuthenticator {
    token: Option<TokenCheck>,
    signature: Option<SignatureCheck>,
}

impl WebhookAuthenticator {
    /// Accepts every request.
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, header: impl Into<String>, expected: impl Into<String>) -> Self {
        self.token = Some(TokenCheck {
            header: header.into(),
            expected: expected.into(),
        });
        self
    }

    pub fn with_signature(mut self, header: impl Into<String>, secret: impl Into<String>) -> Self {
        self.signature = Some(SignatureCheck {
            header: header.into(),
            secret: secret.into(),
        });
        self
    }

    pub fn is_enforcing(&self) -> bool {
        self.token.is_some() || self.signature.is_some()
    }

    /// Headers the gateway must be allowed to send, as configured.
    pub fn header_names(&self) -> Vec<&str> {
        self.token
            .iter()
            .map(|check| check.header.as_str())
            .chain(self.signature.iter().map(|check| check.header.as_str()))
            .collect()
    }

    /// Decides accept/reject from headers and raw body. Has no side effects.
    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), AuthError> {
        if let Some(check) = &self.token {
            let provided = header_value(headers, &check.header)?;
            if !constant_time_eq(provided.as_bytes(), check.expected.as_bytes()) {
                return Err(AuthError::InvalidToken);
            }
        }

        if let Some(check) = &self.signature {
            let provided = header_value(headers, &check.header)?;
            let signature = hex::decode(provided.trim()).map_err(|_| AuthError::InvalidSignature)?;
            let mut mac = HmacSha256::new_from_slice(check.secret.as_bytes())
                .map_err(|_| AuthError::InvalidSignature)?;
            mac.update(body);
            mac.verify_slice(&signature)
                .map_err(|_| AuthError::InvalidSignature)?;
        }

        Ok(())
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AuthError> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AuthError::MissingHeader(name.to_string()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Hex HMAC-SHA256 of `body`, as the signature header is expected to carry it.
pub fn sign_body(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Buffers the body, verifies it and re-injects it for the handler.
pub async fn webhook_auth(
    State(authenticator): State<Arc<WebhookAuthenticator>>,
    req: Request,
    next: Next,
) -> Response {
    if !authenticator.is_enforcing() {
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let bytes: Bytes = match axum::body::to_bytes(body, MAX_WEBHOOK_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read webhook body");
            return AppError::BadRequest("Unreadable request body".to_string()).into_response();
        }
    };

    if let Err(e) = authenticator.verify(&parts.headers, &bytes) {
        tracing::error!(error = %e, "Rejected webhook");
        return AppError::Unauthorized(e.to_string()).into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_permissive_accepts_anything() {
        let auth = WebhookAuthenticator::permissive();
        assert!(!auth.is_enforcing());
        assert_eq!(auth.verify(&HeaderMap::new(), b"{}"), Ok(()));
    }

    #[test]
    fn test_header_names_follow_configuration() {
        assert!(WebhookAuthenticator::permissive().header_names().is_empty());

        let auth = WebhookAuthenticator::permissive()
            .with_token("x-custom-token", "t")
            .with_signature(DEFAULT_SIGNATURE_HEADER, "s");
        assert_eq!(auth.header_names(), vec!["x-custom-token", DEFAULT_SIGNATURE_HEADER]);
    }

    #[test]
    fn test_token_exact_match() {
        let auth = WebhookAuthenticator::permissive().with_token(DEFAULT_TOKEN_HEADER, "s3cret");

        assert_eq!(auth.verify(&headers(&[(DEFAULT_TOKEN_HEADER, "s3cret")]), b""), Ok(()));
        assert_eq!(
            auth.verify(&headers(&[(DEFAULT_TOKEN_HEADER, "s3cre")]), b""),
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            auth.verify(&headers(&[(DEFAULT_TOKEN_HEADER, "S3CRET")]), b""),
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            auth.verify(&HeaderMap::new(), b""),
            Err(AuthError::MissingHeader(DEFAULT_TOKEN_HEADER.to_string()))
        );
    }

    #[test]
    fn test_constant_time_eq_length_mismatch() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"", b"a"));
    }

    #[test]
    fn test_signature_over_raw_body() {
        let body = br#"{"event":"PAYMENT_CONFIRMED"}"#;
        let auth = WebhookAuthenticator::permissive().with_signature(DEFAULT_SIGNATURE_HEADER, "hmac-key");
        let signature = sign_body("hmac-key", body).unwrap();

        assert_eq!(auth.verify(&headers(&[(DEFAULT_SIGNATURE_HEADER, &signature)]), body), Ok(()));
        assert_eq!(
            auth.verify(&headers(&[(DEFAULT_SIGNATURE_HEADER, &signature)]), b"{}"),
            Err(AuthError::InvalidSignature)
        );
        assert_eq!(
            auth.verify(&headers(&[(DEFAULT_SIGNATURE_HEADER, "zz-not-hex")]), body),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_token_and_signature_both_required() {
        let body = b"{}";
        let auth = WebhookAuthenticator::permissive()
            .with_token(DEFAULT_TOKEN_HEADER, "tok")
            .with_signature(DEFAULT_SIGNATURE_HEADER, "key");
        let signature = sign_body("key", body).unwrap();

        assert!(auth.verify(&headers(&[(DEFAULT_TOKEN_HEADER, "tok")]), body).is_err());
        assert_eq!(
            auth.verify(
                &headers(&[(DEFAULT_TOKEN_HEADER, "tok"), (DEFAULT_SIGNATURE_HEADER, &signature)]),
                body
            ),
            Ok(())
        );
    }
}
