//! Raw HTTP response type

use crate::error::{RestError, RestResult};
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

/// HTTP response as received from the bound host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status_code: u16,

    /// Response headers, names lower-cased
    pub headers: HashMap<String, String>,

    /// Response body
    pub body: Bytes,

    /// Request latency in milliseconds
    pub latency_ms: u64,

    /// Final URL
    pub url: String,

    /// HTTP version
    pub version: String,
}

impl HttpResponse {
    /// Check if status is success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Check if status is client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    /// Check if status is server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code)
    }

    /// Check if status is redirect (3xx)
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    /// Get body as text (UTF-8)
    pub fn text(&self) -> RestResult<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| RestError::Execution(format!("Invalid UTF-8 in response: {}", e)))
    }

    /// Get raw bytes
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Get latency as Duration
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Get content type
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Check if content type is JSON
    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false)
    }
}

/// Builder for creating HttpResponse (used in tests and by callers replaying responses)
#[derive(Debug)]
pub struct HttpResponseBuilder {
    status_code: u16,
    headers: HashMap<String, String>,
    body: Bytes,
    latency_ms: u64,
    url: String,
    version: String,
}

impl HttpResponseBuilder {
    pub fn new() -> Self {
        Self {
            status_code: 200,
            headers: HashMap::new(),
            body: Bytes::new(),
            latency_ms: 0,
            url: String::new(),
            version: "HTTP/1.1".to_string(),
        }
    }

    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = code;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn build(self) -> HttpResponse {
        HttpResponse {
            status_code: self.status_code,
            headers: self.headers,
            body: self.body,
            latency_ms: self.latency_ms,
            url: self.url,
            version: self.version,
        }
    }
}

impl Default for HttpResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert reqwest Response to HttpResponse, reading the whole body
pub(crate) async fn from_reqwest(
    response: reqwest::Response,
    latency_ms: u64,
) -> RestResult<HttpResponse> {
    let status_code = response.status().as_u16();
    let url = response.url().to_string();
    let version = format!("{:?}", response.version());

    let mut headers = HashMap::new();
    for (name, value) in response.headers().iter() {
        let v = String::from_utf8_lossy(value.as_bytes());
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&v);
            })
            .or_insert_with(|| v.into_owned());
    }

    let body = response.bytes().await.map_err(RestError::from_transport)?;

    Ok(HttpResponse {
        status_code,
        headers,
        body,
        latency_ms,
        url,
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_status_checks() {
        let response = HttpResponseBuilder::new().status_code(200).build();
        assert!(response.is_success());
        assert!(!response.is_client_error());

        let response = HttpResponseBuilder::new().status_code(404).build();
        assert!(!response.is_success());
        assert!(response.is_client_error());

        let response = HttpResponseBuilder::new().status_code(500).build();
        assert!(response.is_server_error());

        let response = HttpResponseBuilder::new().status_code(302).build();
        assert!(response.is_redirect());
    }

    #[test]
    fn test_response_text() {
        let response = HttpResponseBuilder::new()
            .body(&br#"{"status":"green"}"#[..])
            .build();
        assert_eq!(response.text().unwrap(), r#"{"status":"green"}"#);

        let response = HttpResponseBuilder::new().body(vec![0xff, 0xfe]).build();
        assert!(matches!(response.text(), Err(RestError::Execution(_))));
    }

    #[test]
    fn test_response_header_case_insensitive() {
        let response = HttpResponseBuilder::new()
            .header("Content-Type", "application/json")
            .build();

        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_from_reqwest_keeps_every_header() {
        let raw = http::Response::builder()
            .status(201)
            .header("X-Node", "es01")
            .header("Warning", "299 first")
            .header("Warning", "299 second")
            .header("X-Opaque", http::HeaderValue::from_bytes(b"caf\xe9").unwrap())
            .body("created")
            .unwrap();

        let response = from_reqwest(reqwest::Response::from(raw), 7).await.unwrap();

        assert_eq!(response.status_code, 201);
        assert_eq!(response.latency_ms, 7);
        assert_eq!(response.header("x-node"), Some("es01"));
        assert_eq!(response.header("warning"), Some("299 first, 299 second"));
        assert_eq!(response.header("x-opaque"), Some("caf\u{fffd}"));
        assert_eq!(response.text().unwrap(), "created");
    }

    #[test]
    fn test_response_is_json() {
        let response = HttpResponseBuilder::new()
            .header("Content-Type", "application/json; charset=UTF-8")
            .build();
        assert!(response.is_json());

        let response = HttpResponseBuilder::new()
            .header("Content-Type", "text/plain")
            .build();
        assert!(!response.is_json());
    }
}
