//! Cloud Webhooks Adapter
//!
//! Re-exposes cloud-function style callbacks as HTTP endpoints:
//! - WebhookRouter: registration API and the installed axum route table
//! - Registrations: per hook kind, the identifiers registered at startup
//! - Pipeline: the fixed request-adaptation stages run for every hook call
//! - Envelope encoding: `{success: ..}` / `{error: ..}` responses, always 200
//! - Egress: a single outbound HTTP call for use inside handlers

pub mod auth;
pub mod context;
pub mod domain;
pub mod egress;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod pipeline;
pub mod registry;
pub mod router;

pub use auth::WebhookAuth;
pub use context::{FunctionRequest, HookResponse, InflatedContext, TriggerRequest};
pub use domain::{DomainObject, FieldOp, Payload, SharedObject};
pub use egress::{http_request, EgressError, HttpClient, HttpRequestOptions, HttpResponse};
pub use envelope::{send_error, send_success};
pub use error::{ModelError, WebhookError};
pub use handler::{FunctionHandler, FunctionResult, TriggerHandler};
pub use pipeline::Stage;
pub use registry::{ClassName, HookTarget, Registrations};
pub use router::WebhookRouter;

pub use cw_common::{Envelope, HookKind, WebhookRequest, WEBHOOK_KEY_HEADER};

pub type Result<T> = std::result::Result<T, WebhookError>;
