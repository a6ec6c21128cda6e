//! Cloud Webhooks shared types
//!
//! Wire-level vocabulary used by the adapter and its host:
//! - `HookKind`: the five callback categories and their route prefixes
//! - `WebhookRequest`: the inbound JSON envelope
//! - `Envelope`: the `{success: ..}` / `{error: ..}` response shape

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Header carrying the shared webhook secret
pub const WEBHOOK_KEY_HEADER: &str = "X-Parse-Webhook-Key";

/// Error payload sent when the webhook key does not match
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized Request.";

/// Class name given to an inbound `user` that carries none
pub const USER_CLASS_NAME: &str = "_User";

// ============================================================================
// Hook Kinds
// ============================================================================

/// Trigger/function category of a registered callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookKind {
    BeforeSave,
    AfterSave,
    BeforeDelete,
    AfterDelete,
    Function,
}

impl HookKind {
    /// All kinds in registration-table order
    pub const ALL: [HookKind; 5] = [
        HookKind::BeforeSave,
        HookKind::AfterSave,
        HookKind::BeforeDelete,
        HookKind::AfterDelete,
        HookKind::Function,
    ];

    /// Route prefix and wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::BeforeSave => "beforeSave",
            HookKind::AfterSave => "afterSave",
            HookKind::BeforeDelete => "beforeDelete",
            HookKind::AfterDelete => "afterDelete",
            HookKind::Function => "function",
        }
    }

    /// Synthesized route path for an identifier, e.g. `/beforeSave_Post`
    pub fn route_path(&self, identifier: &str) -> String {
        format!("/{}_{}", self.as_str(), identifier)
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Inbound Envelope
// ============================================================================

/// JSON body posted to every webhook route
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    /// Serialized domain object (save/delete kinds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
    /// Object as stored before the pending update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<Value>,
    /// Partial field update to apply on top of `original`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Map<String, Value>>,
    /// Acting principal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    /// Principal holds elevated privilege
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<bool>,
    /// Function arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<String>,
}

// ============================================================================
// Outbound Envelope
// ============================================================================

/// Response body: exactly one of `{"success": v}` or `{"error": v}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Envelope {
    Success(Value),
    Error(Value),
}

impl Envelope {
    /// Success envelope, `true` when no value is supplied
    pub fn success(value: Option<Value>) -> Self {
        Envelope::Success(value.unwrap_or(Value::Bool(true)))
    }

    /// Error envelope, `true` when no value is supplied
    pub fn error(value: Option<Value>) -> Self {
        Envelope::Error(value.unwrap_or(Value::Bool(true)))
    }

    pub fn unauthorized() -> Self {
        Envelope::Error(Value::String(UNAUTHORIZED_MESSAGE.to_string()))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success(_))
    }
}
