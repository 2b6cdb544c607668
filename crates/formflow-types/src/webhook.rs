//! Webhook domain types.
//!
//! A webhook is a named, reusable outbound HTTP target with its own method,
//! headers, retry and timeout policy, and an optional payload template that
//! shapes the request body from an automation's trigger data.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default request timeout for a webhook when none is supplied.
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 30;

/// Default content type sent with every webhook request.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

// ---------------------------------------------------------------------------
// HttpMethod
// ---------------------------------------------------------------------------

/// HTTP methods a webhook may use. Anything else is rejected at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Whether requests with this method carry a body.
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl Default for HttpMethod {
    fn default() -> Self {
        HttpMethod::Post
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unsupported HTTP method: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// Custom request headers configured on a webhook.
///
/// Stored as a plain string map. When a request is built, these are layered
/// over the default headers; a configured header replaces a default one with
/// the same name regardless of case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookHeaders(BTreeMap<String, String>);

impl WebhookHeaders {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Default headers merged with, and overridden by, the configured ones.
    ///
    /// Header names are lowercased in the result so each name appears once.
    pub fn merged_with_defaults(&self) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        merged.insert("content-type".to_string(), DEFAULT_CONTENT_TYPE.to_string());
        for (name, value) in &self.0 {
            merged.insert(name.to_ascii_lowercase(), value.clone());
        }
        merged
    }
}

impl From<BTreeMap<String, String>> for WebhookHeaders {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for WebhookHeaders {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// How the request body is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    /// Body is the JSON serialization of the (rendered) payload.
    #[default]
    Json,
    /// Body is the rendered payload as plain text (strings are sent verbatim).
    Text,
}

impl PayloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadType::Json => "json",
            PayloadType::Text => "text",
        }
    }
}

impl FromStr for PayloadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(PayloadType::Json),
            "text" => Ok(PayloadType::Text),
            other => Err(format!("invalid payload type: '{other}'")),
        }
    }
}

/// A payload template rendered against trigger data at invocation time.
///
/// The template is a JSON value whose string leaves may contain
/// `{{ trigger.<path> }}` placeholders. Rendering lives in formflow-core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadTemplate(pub serde_json::Value);

impl PayloadTemplate {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

/// A registered webhook target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub is_active: bool,
    pub retry_enabled: bool,
    /// Additional attempts after the first failure.
    pub retry_count: u32,
    pub retry_delay_seconds: u32,
    pub timeout_seconds: u32,
    #[serde(default)]
    pub headers: WebhookHeaders,
    #[serde(default)]
    pub payload_type: PayloadType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_template: Option<PayloadTemplate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    /// Maximum number of HTTP calls a single invocation may issue.
    pub fn max_attempts(&self) -> u32 {
        if self.retry_enabled {
            self.retry_count.saturating_add(1)
        } else {
            1
        }
    }
}

/// Request to register a new webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebhookRequest {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub retry_enabled: bool,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub retry_delay_seconds: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
    #[serde(default)]
    pub headers: WebhookHeaders,
    #[serde(default)]
    pub payload_type: PayloadType,
    #[serde(default)]
    pub payload_template: Option<PayloadTemplate>,
}

/// Partial update of a webhook. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWebhookRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub is_active: Option<bool>,
    pub retry_enabled: Option<bool>,
    pub retry_count: Option<u32>,
    pub retry_delay_seconds: Option<u32>,
    pub timeout_seconds: Option<u32>,
    pub headers: Option<WebhookHeaders>,
    pub payload_type: Option<PayloadType>,
    /// `Some(None)` clears the template.
    #[serde(default, with = "double_option")]
    pub payload_template: Option<Option<PayloadTemplate>>,
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u32 {
    DEFAULT_TIMEOUT_SECONDS
}

/// Distinguishes an absent field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: Serialize, S: Serializer>(
        value: &Option<Option<T>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T: Deserialize<'de>, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<T>>, D::Error> {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_method_parse_and_display() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!(" DELETE ".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!("TRACE".parse::<HttpMethod>().is_err());
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
    }

    #[test]
    fn test_http_method_body_rules() {
        assert!(HttpMethod::Post.carries_body());
        assert!(HttpMethod::Put.carries_body());
        assert!(HttpMethod::Patch.carries_body());
        assert!(!HttpMethod::Get.carries_body());
        assert!(!HttpMethod::Delete.carries_body());
    }

    #[test]
    fn test_headers_override_default_content_type() {
        let headers = WebhookHeaders::from([("Content-Type", "text/plain"), ("X-Token", "abc")]);
        let merged = headers.merged_with_defaults();
        assert_eq!(merged.get("content-type").map(String::as_str), Some("text/plain"));
        assert_eq!(merged.get("x-token").map(String::as_str), Some("abc"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_headers_default_only() {
        let merged = WebhookHeaders::new().merged_with_defaults();
        assert_eq!(merged.get("content-type").map(String::as_str), Some("application/json"));
    }

    #[test]
    fn test_headers_case_insensitive_get() {
        let headers = WebhookHeaders::from([("Authorization", "Bearer t")]);
        assert_eq!(headers.get("authorization"), Some("Bearer t"));
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreateWebhookRequest =
            serde_json::from_value(json!({"name": "crm", "url": "https://crm.example.com/hook"}))
                .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert!(req.is_active);
        assert!(!req.retry_enabled);
        assert_eq!(req.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
        assert_eq!(req.payload_type, PayloadType::Json);
    }

    #[test]
    fn test_update_request_distinguishes_null_template() {
        let cleared: UpdateWebhookRequest =
            serde_json::from_value(json!({"payloadTemplate": null})).unwrap();
        assert!(matches!(cleared.payload_template, Some(None)));

        let untouched: UpdateWebhookRequest = serde_json::from_value(json!({})).unwrap();
        assert!(untouched.payload_template.is_none());
    }

    #[test]
    fn test_max_attempts() {
        let now = Utc::now();
        let mut webhook = Webhook {
            id: Uuid::now_v7(),
            name: "t".to_string(),
            url: "https://example.com".to_string(),
            method: HttpMethod::Post,
            is_active: true,
            retry_enabled: false,
            retry_count: 4,
            retry_delay_seconds: 0,
            timeout_seconds: 5,
            headers: WebhookHeaders::new(),
            payload_type: PayloadType::Json,
            payload_template: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(webhook.max_attempts(), 1);
        webhook.retry_enabled = true;
        assert_eq!(webhook.max_attempts(), 5);
    }
}
