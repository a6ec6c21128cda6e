//! Per-request hook context
//!
//! `InflatedContext` is the state built up by the pipeline for one request.
//! Handlers receive a typed view of it (`TriggerRequest` / `FunctionRequest`)
//! and, for trigger kinds, a `HookResponse` to answer with.

use cw_common::{Envelope, HookKind};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::domain::{DomainObject, Payload, SharedObject};
use crate::error::WebhookError;

/// Inflated request state owned by a single pipeline traversal
#[derive(Debug, Default)]
pub struct InflatedContext {
    pub object: Option<SharedObject>,
    pub user: Option<DomainObject>,
    pub master: Option<bool>,
    pub params: Option<Value>,
    pub installation_id: Option<String>,
}

impl InflatedContext {
    pub fn into_trigger_request(self) -> Result<TriggerRequest, WebhookError> {
        let object = self.object.ok_or(WebhookError::MissingObject)?;
        Ok(TriggerRequest {
            object,
            user: self.user,
            master: self.master,
            installation_id: self.installation_id,
        })
    }

    pub fn into_function_request(self) -> FunctionRequest {
        FunctionRequest {
            params: self.params,
            user: self.user,
            master: self.master,
            installation_id: self.installation_id,
        }
    }
}

/// Request seen by save/delete handlers
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    /// The object being saved or deleted; edits are visible to the beforeSave echo
    pub object: SharedObject,
    pub user: Option<DomainObject>,
    pub master: Option<bool>,
    pub installation_id: Option<String>,
}

impl TriggerRequest {
    pub fn is_master(&self) -> bool {
        self.master.unwrap_or(false)
    }
}

/// Request seen by function handlers
#[derive(Debug, Clone)]
pub struct FunctionRequest {
    pub params: Option<Value>,
    pub user: Option<DomainObject>,
    pub master: Option<bool>,
    pub installation_id: Option<String>,
}

impl FunctionRequest {
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|params| params.get(name))
    }

    pub fn is_master(&self) -> bool {
        self.master.unwrap_or(false)
    }
}

/// Outcome produced by a response method
///
/// `Echo` defers serializing the shared object until the reply is written,
/// so a handler may still hold the object's guard when it calls `success()`.
#[derive(Debug)]
pub(crate) enum Reply {
    Ready(Envelope),
    Echo(SharedObject),
}

impl Reply {
    /// Answer a success with the shared object instead; errors are kept
    pub(crate) fn echo(self, object: SharedObject) -> Self {
        match self {
            Reply::Ready(envelope) if envelope.is_success() => Reply::Echo(object),
            other => other,
        }
    }

    pub(crate) async fn into_envelope(self) -> Envelope {
        match self {
            Reply::Ready(envelope) => envelope,
            Reply::Echo(object) => Envelope::success(Some(object.to_json().await)),
        }
    }
}

pub(crate) type SuccessFn = Box<dyn FnOnce(Option<Payload>) -> Reply + Send>;
pub(crate) type ErrorFn = Box<dyn FnOnce(Option<Value>) -> Reply + Send>;

/// Response methods handed to trigger handlers
///
/// Exactly one of `success`, `success_with` or `error` can be called, since
/// each consumes the response. Pipeline stages decorate the success callback
/// before the handler sees it.
pub struct HookResponse {
    kind: HookKind,
    identifier: String,
    success: SuccessFn,
    error: ErrorFn,
    outlet: Option<oneshot::Sender<Reply>>,
}

impl HookResponse {
    /// Base response methods: log, then build the envelope
    pub(crate) fn install(
        kind: HookKind,
        identifier: &str,
        outlet: Option<oneshot::Sender<Reply>>,
    ) -> Self {
        let success_id = identifier.to_string();
        let error_id = identifier.to_string();

        Self {
            kind,
            identifier: identifier.to_string(),
            success: Box::new(move |payload| {
                let value = payload.map(Payload::into_json);
                info!(hook = %kind, identifier = %success_id, "Hook succeeded");
                debug!(hook = %kind, identifier = %success_id, result = ?value, "Hook result");
                Reply::Ready(Envelope::success(value))
            }),
            error: Box::new(move |value| {
                warn!(hook = %kind, identifier = %error_id, error = ?value, "Hook failed");
                Reply::Ready(Envelope::error(value))
            }),
            outlet,
        }
    }

    /// Response methods whose output is discarded (the reply was already flushed)
    pub(crate) fn detached(kind: HookKind, identifier: &str) -> Self {
        Self {
            kind,
            identifier: identifier.to_string(),
            success: Box::new(|payload| {
                Reply::Ready(Envelope::success(payload.map(Payload::into_json)))
            }),
            error: Box::new(|value| Reply::Ready(Envelope::error(value))),
            outlet: None,
        }
    }

    /// Replace the success callback with one wrapping the current callback
    pub(crate) fn decorate_success<F>(&mut self, decorator: F)
    where
        F: FnOnce(Option<Payload>, SuccessFn) -> Reply + Send + 'static,
    {
        let inner = std::mem::replace(
            &mut self.success,
            Box::new(|payload| Reply::Ready(Envelope::success(payload.map(Payload::into_json)))),
        );
        self.success = Box::new(move |payload| decorator(payload, inner));
    }

    /// True once the HTTP reply has already been sent for this request
    pub fn is_detached(&self) -> bool {
        self.outlet.is_none()
    }

    /// Succeed without an explicit payload
    pub fn success(self) {
        self.finish_success(None);
    }

    pub fn success_with(self, payload: impl Into<Payload>) {
        self.finish_success(Some(payload.into()));
    }

    pub fn error(self, value: impl Into<Value>) {
        let HookResponse {
            kind,
            identifier,
            error,
            outlet,
            ..
        } = self;
        let reply = error(Some(value.into()));
        deliver(kind, &identifier, outlet, reply);
    }

    fn finish_success(self, payload: Option<Payload>) {
        let HookResponse {
            kind,
            identifier,
            success,
            outlet,
            ..
        } = self;
        let reply = success(payload);
        deliver(kind, &identifier, outlet, reply);
    }
}

impl std::fmt::Debug for HookResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookResponse")
            .field("kind", &self.kind)
            .field("identifier", &self.identifier)
            .field("detached", &self.is_detached())
            .finish()
    }
}

pub(crate) fn deliver(
    kind: HookKind,
    identifier: &str,
    outlet: Option<oneshot::Sender<Reply>>,
    reply: Reply,
) {
    match outlet {
        Some(outlet) => {
            if outlet.send(reply).is_err() {
                debug!(hook = %kind, identifier = %identifier, "Client went away before the reply");
            }
        }
        None => {
            debug!(hook = %kind, identifier = %identifier, ?reply, "Already replied, discarding");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response() -> (HookResponse, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (HookResponse::install(HookKind::BeforeSave, "Post", Some(tx)), rx)
    }

    fn ready(rx: &mut oneshot::Receiver<Reply>) -> Envelope {
        match rx.try_recv().unwrap() {
            Reply::Ready(envelope) => envelope,
            other => panic!("expected a ready envelope, got {:?}", other),
        }
    }

    #[test]
    fn test_success_defaults_to_true() {
        let (response, mut rx) = response();
        response.success();
        assert_eq!(ready(&mut rx), Envelope::Success(json!(true)));
    }

    #[test]
    fn test_error_passes_value_through() {
        let (response, mut rx) = response();
        response.error(json!({"code": 141, "message": "nope"}));
        assert_eq!(
            ready(&mut rx),
            Envelope::Error(json!({"code": 141, "message": "nope"}))
        );
    }

    #[test]
    fn test_decorators_compose_outermost_first() {
        let (mut response, mut rx) = response();
        response.decorate_success(|payload, inner| {
            inner(payload.map(|p| Payload::Json(json!([p.into_json(), "first"]))))
        });
        response.decorate_success(|payload, inner| {
            inner(payload.map(|p| Payload::Json(json!([p.into_json(), "second"]))))
        });
        response.success_with("x");
        assert_eq!(ready(&mut rx), Envelope::Success(json!([["x", "second"], "first"])));
    }

    #[tokio::test]
    async fn test_echo_is_built_after_guard_release() {
        let object = SharedObject::new(DomainObject::new("Post"));
        let (mut response, mut rx) = response();
        let echoed = object.clone();
        response.decorate_success(move |payload, inner| match payload {
            Some(payload) => inner(Some(payload)),
            None => inner(None).echo(echoed),
        });

        let mut guard = object.lock().await;
        guard.set("title", "held");
        response.success();
        let reply = rx.try_recv().unwrap();
        assert!(matches!(reply, Reply::Echo(_)));
        drop(guard);

        assert_eq!(
            reply.into_envelope().await,
            Envelope::Success(json!({"className": "Post", "title": "held"}))
        );
    }

    #[test]
    fn test_echo_keeps_errors() {
        let object = SharedObject::new(DomainObject::new("Post"));
        let reply = Reply::Ready(Envelope::error(None)).echo(object);
        assert!(matches!(reply, Reply::Ready(Envelope::Error(_))));
    }

    #[test]
    fn test_detached_response_discards() {
        let response = HookResponse::detached(HookKind::AfterSave, "Post");
        assert!(response.is_detached());
        response.error("ignored");
    }

    #[test]
    fn test_trigger_request_requires_object() {
        let context = InflatedContext::default();
        assert!(matches!(context.into_trigger_request(), Err(WebhookError::MissingObject)));
    }

    #[test]
    fn test_function_request_params() {
        let context = InflatedContext {
            params: Some(json!({"to": "a@example.com"})),
            master: Some(true),
            ..Default::default()
        };
        let request = context.into_function_request();
        assert_eq!(request.param("to"), Some(&json!("a@example.com")));
        assert!(request.param("missing").is_none());
        assert!(request.is_master());
    }
}
