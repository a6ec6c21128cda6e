//! Bundled cloud handlers
//!
//! Post lifecycle hooks plus a few callable functions.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use cw_adapter::{
    http_request, FunctionRequest, FunctionResult, HookResponse, HttpRequestOptions, Payload,
    TriggerRequest, WebhookRouter,
};

const POST_CLASS: &str = "Post";
const MAX_TITLE_LEN: usize = 140;

pub fn register(router: &mut WebhookRouter) -> cw_adapter::Result<()> {
    router
        .register_before_save(POST_CLASS, before_save_post)?
        .register_after_save(POST_CLASS, after_save_post)?
        .register_before_delete(POST_CLASS, before_delete_post)?
        .register_after_delete(POST_CLASS, after_delete_post)?
        .register_function("hello", hello)?
        .register_function("serverTime", server_time)?
        .register_function("fetchStatus", fetch_status)?;
    Ok(())
}

/// Requires a non-empty title, trims it and defaults the view counter
async fn before_save_post(request: TriggerRequest, response: HookResponse) {
    let outcome = {
        let mut post = request.object.lock().await;
        let title = post
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        if title.is_empty() {
            Err("A post must have a title")
        } else if title.chars().count() > MAX_TITLE_LEN {
            Err("Title is too long")
        } else {
            post.set("title", title);
            if !post.has("views") {
                post.set("views", 0);
            }
            Ok(())
        }
    };

    match outcome {
        Ok(()) => response.success(),
        Err(message) => response.error(message),
    }
}

async fn after_save_post(request: TriggerRequest, response: HookResponse) {
    let post = request.object.snapshot().await;
    info!(
        object_id = post.object_id().unwrap_or_default(),
        user = request.user.as_ref().and_then(|u| u.object_id()).unwrap_or_default(),
        "Post saved"
    );
    response.success();
}

/// Only master requests may delete posts
async fn before_delete_post(request: TriggerRequest, response: HookResponse) {
    if request.is_master() {
        response.success();
    } else {
        warn!(installation_id = ?request.installation_id, "Rejected non-master post delete");
        response.error(json!({"code": 119, "message": "Only master requests can delete posts"}));
    }
}

async fn after_delete_post(request: TriggerRequest, response: HookResponse) {
    let post = request.object.snapshot().await;
    info!(object_id = post.object_id().unwrap_or_default(), "Post deleted");
    response.success();
}

async fn hello(request: FunctionRequest) -> FunctionResult {
    let name = request
        .param("name")
        .and_then(Value::as_str)
        .or_else(|| {
            request
                .user
                .as_ref()
                .and_then(|u| u.get("username"))
                .and_then(Value::as_str)
        })
        .unwrap_or("world");
    Ok(format!("Hello, {}!", name).into())
}

async fn server_time(_request: FunctionRequest) -> FunctionResult {
    Ok(Payload::Date(Utc::now()))
}

/// Report the HTTP status of an http(s) URL
async fn fetch_status(request: FunctionRequest) -> FunctionResult {
    let url = match request.param("url").and_then(Value::as_str) {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => url.to_string(),
        _ => return Err(json!("Parameter url must be an http(s) URL")),
    };

    let response = http_request(HttpRequestOptions::get(url.clone()))
        .await
        .map_err(|e| json!(e.to_string()))?;

    Ok(Payload::Json(json!({
        "url": url,
        "status": response.status,
        "ok": response.is_success(),
    })))
}
