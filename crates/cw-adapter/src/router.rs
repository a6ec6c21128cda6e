//! Route installer
//!
//! `WebhookRouter` is built once at startup: each registration binds a POST
//! route at `/<hookKind>_<identifier>` and records the identifier. The
//! finished axum router wraps every route in webhook key authentication.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use cw_common::{Envelope, HookKind, WebhookRequest};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::auth::{require_webhook_key, WebhookAuth};
use crate::envelope::send;
use crate::handler::{FunctionHandler, RouteHandler, TriggerHandler};
use crate::pipeline::{self, Exchange};
use crate::registry::{validate_identifier, HookTarget, Registrations};
use crate::Result;

/// Error payload when a trigger handler drops its response unanswered
pub const NO_RESPONSE_MESSAGE: &str = "Hook handler completed without a response.";

/// A bound route: kind, identifier and handler
struct Route {
    kind: HookKind,
    identifier: String,
    handler: RouteHandler,
}

/// Registration API and route table for webhook handlers
pub struct WebhookRouter {
    router: Router,
    registrations: Registrations,
    auth: WebhookAuth,
}

impl WebhookRouter {
    /// Create an empty router; an empty webhook key is a startup error
    pub fn new(webhook_key: impl Into<String>) -> Result<Self> {
        Ok(Self::with_auth(WebhookAuth::new(webhook_key)?))
    }

    pub fn with_auth(auth: WebhookAuth) -> Self {
        Self {
            router: Router::new(),
            registrations: Registrations::new(),
            auth,
        }
    }

    pub fn register_before_save<T, H>(&mut self, target: T, handler: H) -> Result<&mut Self>
    where
        T: HookTarget,
        H: TriggerHandler + 'static,
    {
        let handler = RouteHandler::Trigger(Arc::new(handler));
        self.install(HookKind::BeforeSave, target.identifier(), handler)
    }

    pub fn register_after_save<T, H>(&mut self, target: T, handler: H) -> Result<&mut Self>
    where
        T: HookTarget,
        H: TriggerHandler + 'static,
    {
        let handler = RouteHandler::Trigger(Arc::new(handler));
        self.install(HookKind::AfterSave, target.identifier(), handler)
    }

    pub fn register_before_delete<T, H>(&mut self, target: T, handler: H) -> Result<&mut Self>
    where
        T: HookTarget,
        H: TriggerHandler + 'static,
    {
        let handler = RouteHandler::Trigger(Arc::new(handler));
        self.install(HookKind::BeforeDelete, target.identifier(), handler)
    }

    pub fn register_after_delete<T, H>(&mut self, target: T, handler: H) -> Result<&mut Self>
    where
        T: HookTarget,
        H: TriggerHandler + 'static,
    {
        let handler = RouteHandler::Trigger(Arc::new(handler));
        self.install(HookKind::AfterDelete, target.identifier(), handler)
    }

    pub fn register_function<T, H>(&mut self, name: T, handler: H) -> Result<&mut Self>
    where
        T: HookTarget,
        H: FunctionHandler + 'static,
    {
        let handler = RouteHandler::Function(Arc::new(handler));
        self.install(HookKind::Function, name.identifier(), handler)
    }

    fn install(
        &mut self,
        kind: HookKind,
        identifier: String,
        handler: RouteHandler,
    ) -> Result<&mut Self> {
        validate_identifier(&identifier)?;
        self.registrations.record(kind, &identifier)?;

        let path = kind.route_path(&identifier);
        let route = Arc::new(Route {
            kind,
            identifier,
            handler,
        });

        let router = std::mem::take(&mut self.router);
        self.router = router.route(
            &path,
            post(move |body: std::result::Result<Json<WebhookRequest>, JsonRejection>| {
                accept(route.clone(), body)
            }),
        );

        info!(hook = %kind, path = %path, "Registered webhook route");
        Ok(self)
    }

    /// Identifiers registered so far, per kind
    pub fn registrations(&self) -> &Registrations {
        &self.registrations
    }

    /// Finish registration: the route table with authentication applied
    ///
    /// Unmatched paths also pass through authentication before the 404.
    pub fn into_router(self) -> Router {
        self.router
            .fallback(unknown_route)
            .layer(middleware::from_fn_with_state(self.auth, require_webhook_key))
    }
}

impl std::fmt::Debug for WebhookRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookRouter")
            .field("registrations", &self.registrations)
            .finish()
    }
}

/// Decode the body, answering type mismatches with an error envelope
///
/// Bodies that are not JSON at all keep the extractor's own rejection.
async fn accept(
    route: Arc<Route>,
    body: std::result::Result<Json<WebhookRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(body)) => dispatch(route, body).await,
        Err(JsonRejection::JsonDataError(rejection)) => {
            warn!(
                hook = %route.kind,
                identifier = %route.identifier,
                error = %rejection.body_text(),
                "Rejected webhook body"
            );
            send(Envelope::error(Some(Value::String(rejection.body_text()))))
        }
        Err(rejection) => rejection.into_response(),
    }
}

/// Run the pipeline in its own task and wait for the envelope
///
/// The reply is sent as soon as an envelope is produced, so afterSave and
/// afterDelete answer while their handler keeps running.
async fn dispatch(route: Arc<Route>, body: WebhookRequest) -> Response {
    let (outlet, reply) = oneshot::channel();
    let span = info_span!(
        "webhook",
        hook = %route.kind,
        identifier = %route.identifier,
        request_id = %Uuid::new_v4(),
    );

    let exchange = Exchange::new(route.kind, route.identifier.clone(), body, outlet);
    tokio::spawn(pipeline::run(exchange, route.handler.clone()).instrument(span));

    match reply.await {
        Ok(reply) => send(reply.into_envelope().await),
        Err(_) => {
            warn!(
                hook = %route.kind,
                identifier = %route.identifier,
                "Hook handler finished without responding"
            );
            send(Envelope::error(Some(Value::String(NO_RESPONSE_MESSAGE.to_string()))))
        }
    }
}

async fn unknown_route() -> StatusCode {
    StatusCode::NOT_FOUND
}

impl From<WebhookRouter> for Router {
    fn from(router: WebhookRouter) -> Self {
        router.into_router()
    }
}
