//! Request-adaptation pipeline
//!
//! Each hook kind runs a fixed chain of stages over an `Exchange` (the
//! decoded body, the inflated context and the response methods), then hands
//! control to the registered handler. A failing stage answers with an error
//! envelope and stops the chain.

use cw_common::{Envelope, HookKind, WebhookRequest, USER_CLASS_NAME};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::context::{deliver, HookResponse, InflatedContext, Reply};
use crate::domain::{DomainObject, Payload, SharedObject};
use crate::error::WebhookError;
use crate::handler::RouteHandler;

/// One request-transformation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Log hook kind and identifier on entry
    LogEntry,
    /// Copy `installationId` into the context
    PropagateInstallationId,
    /// Copy function `params` into the context
    PropagateParams,
    /// Install the base `success` / `error` response methods
    InstallResponseMethods,
    /// Pass function results through the structural encoder
    EncodeFunctionResult,
    /// Rebuild the object from `object`, or from `original` plus `update`
    InflateObject,
    /// Rebuild `user` (class defaults to `_User`) and copy `master`
    InflateUser,
    /// A payload-less `success` echoes the object back
    EchoObjectOnSuccess,
    /// Send `{success: {}}` now; later handler output is discarded
    RespondImmediately,
}

impl Stage {
    /// Ordered stage chain for a hook kind; the handler runs after the last stage
    pub fn chain(kind: HookKind) -> &'static [Stage] {
        use Stage::*;
        match kind {
            HookKind::BeforeSave => &[
                LogEntry,
                PropagateInstallationId,
                InstallResponseMethods,
                InflateObject,
                InflateUser,
                EchoObjectOnSuccess,
            ],
            HookKind::AfterSave | HookKind::AfterDelete => &[
                LogEntry,
                PropagateInstallationId,
                InstallResponseMethods,
                InflateObject,
                InflateUser,
                RespondImmediately,
            ],
            HookKind::BeforeDelete => &[
                LogEntry,
                PropagateInstallationId,
                InstallResponseMethods,
                InflateObject,
                InflateUser,
            ],
            HookKind::Function => &[
                LogEntry,
                PropagateInstallationId,
                PropagateParams,
                InstallResponseMethods,
                EncodeFunctionResult,
                InflateUser,
            ],
        }
    }
}

/// Per-request pipeline state
pub(crate) struct Exchange {
    kind: HookKind,
    identifier: String,
    body: WebhookRequest,
    context: InflatedContext,
    response: Option<HookResponse>,
    outlet: Option<oneshot::Sender<Reply>>,
}

impl Exchange {
    pub(crate) fn new(
        kind: HookKind,
        identifier: impl Into<String>,
        body: WebhookRequest,
        outlet: oneshot::Sender<Reply>,
    ) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            body,
            context: InflatedContext::default(),
            response: None,
            outlet: Some(outlet),
        }
    }

    fn apply(&mut self, stage: Stage) -> Result<(), WebhookError> {
        match stage {
            Stage::LogEntry => {
                info!(hook = %self.kind, identifier = %self.identifier, "Running hook");
            }
            Stage::PropagateInstallationId => {
                self.context.installation_id = self.body.installation_id.clone();
            }
            Stage::PropagateParams => {
                self.context.params = self.body.params.clone();
            }
            Stage::InstallResponseMethods => {
                let outlet = self.outlet.take();
                self.response = Some(HookResponse::install(self.kind, &self.identifier, outlet));
            }
            Stage::EncodeFunctionResult => {
                self.response_mut()?.decorate_success(|payload, inner| {
                    inner(payload.map(|p| Payload::Json(p.encode())))
                });
            }
            Stage::InflateObject => {
                let object = inflate_object(&self.body)?;
                self.context.object = Some(SharedObject::new(object));
            }
            Stage::InflateUser => {
                self.context.user = inflate_user(&self.body)?;
                self.context.master = self.body.master;
            }
            Stage::EchoObjectOnSuccess => {
                let object = self.context.object.clone().ok_or(WebhookError::MissingObject)?;
                self.response_mut()?.decorate_success(move |payload, inner| match payload {
                    Some(payload) => inner(Some(payload)),
                    None => inner(None).echo(object),
                });
            }
            Stage::RespondImmediately => {
                let response = self
                    .response
                    .take()
                    .ok_or(WebhookError::ResponseNotInstalled)?;
                response.success_with(json!({}));
                self.response = Some(HookResponse::detached(self.kind, &self.identifier));
            }
        }
        Ok(())
    }

    fn response_mut(&mut self) -> Result<&mut HookResponse, WebhookError> {
        self.response.as_mut().ok_or(WebhookError::ResponseNotInstalled)
    }

    /// Answer with an error envelope built from a pipeline failure
    fn fail(mut self, error: WebhookError) {
        warn!(
            hook = %self.kind,
            identifier = %self.identifier,
            error = %error,
            "Hook request rejected"
        );
        let value = Value::String(error.to_string());
        match self.response.take() {
            Some(response) => response.error(value),
            None => {
                let reply = Reply::Ready(Envelope::error(Some(value)));
                deliver(self.kind, &self.identifier, self.outlet.take(), reply);
            }
        }
    }

    async fn invoke(mut self, handler: RouteHandler) {
        let Some(response) = self.response.take() else {
            return self.fail(WebhookError::ResponseNotInstalled);
        };
        let context = std::mem::take(&mut self.context);

        match handler {
            RouteHandler::Trigger(handler) => match context.into_trigger_request() {
                Ok(request) => handler.handle(request, response).await,
                Err(error) => response.error(Value::String(error.to_string())),
            },
            RouteHandler::Function(handler) => {
                match handler.call(context.into_function_request()).await {
                    Ok(payload) => response.success_with(payload),
                    Err(error) => response.error(error),
                }
            }
        }
    }
}

/// Run the stage chain for the exchange's kind, then the handler
pub(crate) async fn run(mut exchange: Exchange, handler: RouteHandler) {
    for stage in Stage::chain(exchange.kind) {
        if let Err(error) = exchange.apply(*stage) {
            exchange.fail(error);
            return;
        }
    }
    exchange.invoke(handler).await;
}

/// Rebuild the object; the request body is left untouched
pub(crate) fn inflate_object(body: &WebhookRequest) -> Result<DomainObject, WebhookError> {
    if let (Some(original), Some(update)) = (&body.original, &body.update) {
        let mut object = DomainObject::from_json(original)?;
        object.apply_update(update)?;
        return Ok(object);
    }

    let object = body.object.as_ref().ok_or(WebhookError::MissingObject)?;
    Ok(DomainObject::from_json(object)?)
}

pub(crate) fn inflate_user(body: &WebhookRequest) -> Result<Option<DomainObject>, WebhookError> {
    let Some(user) = &body.user else {
        return Ok(None);
    };

    let mut user = user.clone();
    if let Some(map) = user.as_object_mut() {
        let unnamed = match map.get("className") {
            None | Some(Value::Null) => true,
            Some(Value::String(name)) => name.is_empty(),
            Some(_) => false,
        };
        if unnamed {
            map.insert(
                "className".to_string(),
                Value::String(USER_CLASS_NAME.to_string()),
            );
        }
    }
    Ok(Some(DomainObject::from_json(&user)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TriggerRequest;
    use std::sync::Arc;

    fn exchange(kind: HookKind, body: Value) -> (Exchange, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let body: WebhookRequest = serde_json::from_value(body).unwrap();
        (Exchange::new(kind, "Post", body, tx), rx)
    }

    fn run_stages(exchange: &mut Exchange) -> Result<(), WebhookError> {
        for stage in Stage::chain(exchange.kind) {
            exchange.apply(*stage)?;
        }
        Ok(())
    }

    #[test]
    fn test_chains() {
        use Stage::*;
        assert_eq!(
            Stage::chain(HookKind::BeforeSave),
            [
                LogEntry,
                PropagateInstallationId,
                InstallResponseMethods,
                InflateObject,
                InflateUser,
                EchoObjectOnSuccess
            ]
        );
        assert_eq!(Stage::chain(HookKind::AfterSave), Stage::chain(HookKind::AfterDelete));
        assert_eq!(Stage::chain(HookKind::AfterSave).last(), Some(&RespondImmediately));
        assert!(!Stage::chain(HookKind::BeforeDelete).contains(&EchoObjectOnSuccess));
        assert!(!Stage::chain(HookKind::Function).contains(&InflateObject));

        // Every chain installs the response methods before decorating them
        for kind in HookKind::ALL {
            let chain = Stage::chain(kind);
            let install = chain.iter().position(|s| *s == InstallResponseMethods).unwrap();
            for decorator in [EncodeFunctionResult, EchoObjectOnSuccess, RespondImmediately] {
                if let Some(position) = chain.iter().position(|s| *s == decorator) {
                    assert!(position > install, "{:?} before install in {}", decorator, kind);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_inflate_original_and_update_keeps_body() {
        let (mut exchange, _rx) = exchange(
            HookKind::BeforeSave,
            json!({
                "original": {"className": "Post", "objectId": "1", "title": "a", "likes": 1},
                "update": {"title": "b", "likes": {"__op": "Increment", "amount": 1}}
            }),
        );
        let body_before = exchange.body.clone();
        run_stages(&mut exchange).unwrap();

        let object = exchange.context.object.as_ref().unwrap().snapshot().await;
        assert_eq!(object.get("title"), Some(&json!("b")));
        assert_eq!(object.get("likes"), Some(&json!(2)));
        assert_eq!(exchange.body, body_before);
    }

    #[test]
    fn test_update_without_original_uses_object() {
        let body: WebhookRequest = serde_json::from_value(json!({
            "object": {"className": "Post", "title": "a"},
            "update": {"title": "b"}
        }))
        .unwrap();
        let object = inflate_object(&body).unwrap();
        assert_eq!(object.get("title"), Some(&json!("a")));
    }

    #[test]
    fn test_inflate_user_defaults_class() {
        let (mut exchange, _rx) = exchange(
            HookKind::Function,
            json!({
                "user": {"objectId": "u1", "username": "ann"},
                "master": false,
                "params": {"x": 1}
            }),
        );
        run_stages(&mut exchange).unwrap();

        let user = exchange.context.user.as_ref().unwrap();
        assert_eq!(user.class_name(), "_User");
        assert_eq!(user.object_id(), Some("u1"));
        assert_eq!(exchange.context.master, Some(false));
        assert_eq!(exchange.context.params, Some(json!({"x": 1})));
    }

    #[test]
    fn test_inflate_user_null_or_empty_class_defaults() {
        for class_name in [Value::Null, json!("")] {
            let body: WebhookRequest = serde_json::from_value(json!({
                "user": {"className": class_name, "objectId": "u1"}
            }))
            .unwrap();
            let user = inflate_user(&body).unwrap().unwrap();
            assert_eq!(user.class_name(), "_User");
            assert_eq!(user.object_id(), Some("u1"));
        }

        let body: WebhookRequest = serde_json::from_value(json!({
            "user": {"className": "Admin", "objectId": "u2"}
        }))
        .unwrap();
        assert_eq!(inflate_user(&body).unwrap().unwrap().class_name(), "Admin");
    }

    #[test]
    fn test_master_copied_without_user() {
        let (mut exchange, _rx) = exchange(
            HookKind::BeforeDelete,
            json!({"object": {"className": "Post"}, "master": true, "installationId": "i-1"}),
        );
        run_stages(&mut exchange).unwrap();
        assert!(exchange.context.user.is_none());
        assert_eq!(exchange.context.master, Some(true));
        assert_eq!(exchange.context.installation_id.as_deref(), Some("i-1"));
    }

    #[tokio::test]
    async fn test_echo_while_handler_holds_guard() {
        let (exchange, rx) = exchange(
            HookKind::BeforeSave,
            json!({"object": {"className": "Post", "objectId": "1"}}),
        );
        let handler = RouteHandler::Trigger(Arc::new(
            |request: TriggerRequest, response: HookResponse| async move {
                let mut post = request.object.lock().await;
                post.set("title", "edited");
                response.success();
                post.set("after", true);
            },
        ));
        run(exchange, handler).await;

        let envelope = rx.await.unwrap().into_envelope().await;
        assert_eq!(
            envelope,
            Envelope::Success(json!({
                "className": "Post",
                "objectId": "1",
                "title": "edited",
                "after": true
            }))
        );
    }

    #[tokio::test]
    async fn test_missing_object_answers_error() {
        let (exchange, rx) = exchange(HookKind::BeforeSave, json!({"master": true}));
        let handler = RouteHandler::Trigger(Arc::new(
            |_request: TriggerRequest, response: HookResponse| async move {
                response.success();
            },
        ));
        run(exchange, handler).await;

        let envelope = rx.await.unwrap().into_envelope().await;
        assert_eq!(envelope, Envelope::Error(json!("Request is missing an object")));
    }

    #[tokio::test]
    async fn test_respond_immediately_flushes_before_handler() {
        let (mut exchange, mut rx) =
            exchange(HookKind::AfterSave, json!({"object": {"className": "Post"}}));
        run_stages(&mut exchange).unwrap();

        let envelope = rx.try_recv().unwrap().into_envelope().await;
        assert_eq!(envelope, Envelope::Success(json!({})));
        assert!(exchange.response.as_ref().unwrap().is_detached());
    }
}
