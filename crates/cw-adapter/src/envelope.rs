//! Response envelope encoding
//!
//! Every adapter response is HTTP 200; the envelope carries the outcome.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cw_common::Envelope;
use serde_json::Value;

/// Write an envelope as a 200 JSON response
pub fn send(envelope: Envelope) -> Response {
    (StatusCode::OK, Json(envelope)).into_response()
}

/// `{"success": value}`, `true` when no value is given
pub fn send_success(value: Option<Value>) -> Response {
    send(Envelope::success(value))
}

/// `{"error": value}`, `true` when no value is given
pub fn send_error(value: Option<Value>) -> Response {
    send(Envelope::error(value))
}
