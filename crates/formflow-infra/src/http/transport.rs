//! reqwest-backed [`WebhookTransport`].
//!
//! Sends exactly one request per call. Retries, truncation and event
//! logging belong to the invoker in formflow-core.

use std::time::Duration;

use formflow_core::automation::transport::{
    InvocationError, WebhookRequest, WebhookResponse, WebhookTransport,
};
use formflow_types::webhook::HttpMethod;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Webhook transport over a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport that sends `user_agent` unless a webhook sets its own.
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn header_map(request: &WebhookRequest) -> Result<HeaderMap, InvocationError> {
    let mut headers = HeaderMap::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| InvocationError::Request(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| InvocationError::Request(format!("invalid value for header '{name}': {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn classify(error: reqwest::Error, timeout: Duration) -> InvocationError {
    if error.is_timeout() {
        InvocationError::Timeout(timeout)
    } else if error.is_builder() {
        InvocationError::Request(error.to_string())
    } else {
        InvocationError::Transport(error.to_string())
    }
}

impl WebhookTransport for ReqwestTransport {
    async fn send(&self, request: WebhookRequest) -> Result<WebhookResponse, InvocationError> {
        let headers = header_map(&request)?;
        let timeout = request.timeout;

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url)
            .headers(headers)
            .timeout(timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        tracing::debug!(
            method = request.method.as_str(),
            url = %request.url,
            "sending webhook request"
        );

        let response = builder.send().await.map_err(|e| classify(e, timeout))?;
        let status = response.status().as_u16();
        let body = read_body(response, request.max_body_bytes, timeout).await?;

        Ok(WebhookResponse { status, body })
    }
}

/// Read the response body chunk by chunk, stopping once more than `max`
/// bytes are in hand. The few extra bytes kept past `max` let the invoker
/// see that the body was cut and finish a character split at the limit.
async fn read_body(
    mut response: reqwest::Response,
    max: usize,
    timeout: Duration,
) -> Result<String, InvocationError> {
    let keep = max.saturating_add(4);
    let mut buf: Vec<u8> = Vec::new();

    while let Some(chunk) = response.chunk().await.map_err(|e| classify(e, timeout))? {
        let room = keep - buf.len();
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            tracing::debug!(max, "response body over limit, rest discarded");
            break;
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}
