//! Handler traits
//!
//! Save/delete hooks implement `TriggerHandler` and answer through the
//! `HookResponse` they are given. Functions implement `FunctionHandler` and
//! return their outcome. Async closures of the matching shape implement both.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::context::{FunctionRequest, HookResponse, TriggerRequest};
use crate::domain::Payload;

/// Outcome of a function call: success payload or verbatim error payload
pub type FunctionResult = Result<Payload, Value>;

#[async_trait]
pub trait TriggerHandler: Send + Sync {
    /// Handle a save/delete hook. The response may also be moved elsewhere
    /// and answered later.
    async fn handle(&self, request: TriggerRequest, response: HookResponse);
}

#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(&self, request: FunctionRequest) -> FunctionResult;
}

#[async_trait]
impl<F, Fut> TriggerHandler for F
where
    F: Fn(TriggerRequest, HookResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, request: TriggerRequest, response: HookResponse) {
        (self)(request, response).await
    }
}

#[async_trait]
impl<F, Fut> FunctionHandler for F
where
    F: Fn(FunctionRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FunctionResult> + Send + 'static,
{
    async fn call(&self, request: FunctionRequest) -> FunctionResult {
        (self)(request).await
    }
}

/// Handler bound to a route
#[derive(Clone)]
pub(crate) enum RouteHandler {
    Trigger(Arc<dyn TriggerHandler>),
    Function(Arc<dyn FunctionHandler>),
}
