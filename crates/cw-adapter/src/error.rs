//! Adapter Error Types

use cw_common::HookKind;
use thiserror::Error;

/// Failures reconstructing a domain object from its wire form
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Expected a JSON object for {what}")]
    NotAnObject { what: &'static str },

    #[error("Object is missing className")]
    MissingClassName,

    #[error("Invalid objectId: expected a string")]
    InvalidObjectId,

    #[error("Unsupported operation {op} on field {field}")]
    UnsupportedOperation { field: String, op: String },

    #[error("Invalid {op} on field {field}: {reason}")]
    InvalidOperand { field: String, op: String, reason: String },
}

impl ModelError {
    pub fn invalid_operand(
        field: impl Into<String>,
        op: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOperand {
            field: field.into(),
            op: op.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Webhook key is not configured")]
    MissingWebhookKey,

    #[error("A {kind} hook is already registered for {identifier}")]
    DuplicateRegistration { kind: HookKind, identifier: String },

    #[error("Invalid hook identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Request is missing an object")]
    MissingObject,

    #[error("Response methods are not installed")]
    ResponseNotInstalled,

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl WebhookError {
    pub fn duplicate(kind: HookKind, identifier: impl Into<String>) -> Self {
        Self::DuplicateRegistration {
            kind,
            identifier: identifier.into(),
        }
    }
}
