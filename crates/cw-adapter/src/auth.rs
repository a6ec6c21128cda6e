//! Webhook key authentication
//!
//! Applied to the whole adapter router before routing. A request whose
//! `X-Parse-Webhook-Key` header does not match the configured key gets
//! `{"error": "Unauthorized Request."}` (status 200) and never reaches a hook.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use cw_common::{Envelope, WEBHOOK_KEY_HEADER};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::envelope::send;
use crate::error::WebhookError;

/// Configured webhook secret
#[derive(Clone)]
pub struct WebhookAuth {
    key: Arc<str>,
}

impl WebhookAuth {
    /// Surrounding whitespace is trimmed; an empty key fails
    pub fn new(key: impl Into<String>) -> Result<Self, WebhookError> {
        let key = key.into();
        let key = key.trim();
        if key.is_empty() {
            return Err(WebhookError::MissingWebhookKey);
        }
        Ok(Self { key: key.into() })
    }

    /// Constant-time comparison against the configured key
    pub fn verify(&self, provided: Option<&str>) -> bool {
        match provided {
            Some(provided) => provided.as_bytes().ct_eq(self.key.as_bytes()).into(),
            None => false,
        }
    }
}

impl std::fmt::Debug for WebhookAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAuth").field("key", &"[redacted]").finish()
    }
}

/// Authentication middleware
pub async fn require_webhook_key(
    State(auth): State<WebhookAuth>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(WEBHOOK_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if auth.verify(provided) {
        return next.run(request).await;
    }

    warn!(
        path = %request.uri().path(),
        header_present = provided.is_some(),
        "Rejected webhook request with invalid key"
    );
    send(Envelope::unauthorized())
}
