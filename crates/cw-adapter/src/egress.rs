//! Outbound HTTP helper
//!
//! One best-effort request per call: no retry, timeout or backoff. Any HTTP
//! status counts as a completed request; only transport failures are errors.

use reqwest::header::ACCEPT;
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum EgressError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("HTTP request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Outbound request description
#[derive(Debug, Clone)]
pub struct HttpRequestOptions {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Query string parameters
    pub params: Vec<(String, String)>,
    /// Sent as a JSON body when present
    pub body: Option<Value>,
}

impl HttpRequestOptions {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, url).json(body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Completed outbound response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Raw response body
    pub text: String,
    /// Body parsed as JSON, when it parses
    pub data: Option<Value>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Egress client wrapping a reqwest client
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, EgressError> {
        let client = reqwest::Client::builder().build().map_err(EgressError::Client)?;
        Ok(Self { client })
    }

    pub async fn http_request(
        &self,
        options: HttpRequestOptions,
    ) -> Result<HttpResponse, EgressError> {
        let HttpRequestOptions {
            method,
            url,
            headers,
            params,
            body,
        } = options;

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(ACCEPT, "application/json");
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !params.is_empty() {
            request = request.query(&params);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        debug!(method = %method, url = %url, "Sending outbound request");

        let response = match request.send().await {
            Ok(response) => response,
            Err(source) => return Err(transport_error(url, source)),
        };

        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.to_string(), value.to_string()))
            })
            .collect();

        let text = match response.text().await {
            Ok(text) => text,
            Err(source) => return Err(transport_error(url, source)),
        };
        let data = serde_json::from_str(&text).ok();

        debug!(method = %method, url = %url, status, "Outbound request completed");

        Ok(HttpResponse {
            status,
            headers: response_headers,
            text,
            data,
        })
    }
}

fn transport_error(url: String, source: reqwest::Error) -> EgressError {
    error!(url = %url, error = %source, "Outbound HTTP request failed");
    EgressError::Transport { url, source }
}

static DEFAULT_CLIENT: OnceLock<HttpClient> = OnceLock::new();

fn default_client() -> Result<&'static HttpClient, EgressError> {
    if let Some(client) = DEFAULT_CLIENT.get() {
        return Ok(client);
    }
    let client = HttpClient::new()?;
    Ok(DEFAULT_CLIENT.get_or_init(|| client))
}

/// Perform one outbound request with the process-wide default client
pub async fn http_request(options: HttpRequestOptions) -> Result<HttpResponse, EgressError> {
    default_client()?.http_request(options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_parses_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("limit", "2"))
            .and(header("x-api-key", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [1, 2]})))
            .expect(1)
            .mount(&server)
            .await;

        let response = http_request(
            HttpRequestOptions::get(format!("{}/items", server.uri()))
                .param("limit", "2")
                .header("x-api-key", "abc"),
        )
        .await
        .unwrap();

        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(response.data, Some(json!({"items": [1, 2]})));
        assert_eq!(response.text, r#"{"items":[1,2]}"#);
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mail"))
            .and(body_json(json!({"to": "a@example.com"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let response = client
            .http_request(HttpRequestOptions::post(
                format!("{}/mail", server.uri()),
                json!({"to": "a@example.com"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status, 202);
        assert_eq!(response.text, "");
        assert!(response.data.is_none());
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let response = http_request(HttpRequestOptions::get(server.uri())).await.unwrap();
        assert_eq!(response.status, 500);
        assert!(!response.is_success());
        assert_eq!(response.text, "boom");
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let result = http_request(HttpRequestOptions::get("http://127.0.0.1:1/unreachable")).await;
        assert!(matches!(result, Err(EgressError::Transport { .. })));
    }
}
