//! HTTP transport layer for Drive downloads and backend uploads.

use crate::config::DriveIntakeConfig;
use crate::errors::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::{header::HeaderMap, Client, Method, StatusCode};
use url::Url;

/// HTTP transport abstraction for testability.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send an HTTP request and receive a response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// HTTP request representation.
#[derive(Debug)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Request URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Option<RequestBody>,
    /// Request timeout.
    pub timeout: Option<std::time::Duration>,
}

impl HttpRequest {
    /// Creates a bodiless request.
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }
}

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET method.
    Get,
    /// POST method.
    Post,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        }
    }
}

/// Request body variants.
pub enum RequestBody {
    /// Fixed-size bytes.
    Bytes(Bytes),
    /// `multipart/form-data` body.
    Form(FormData),
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            RequestBody::Form(form) => write!(f, "Form({} parts)", form.parts.len()),
        }
    }
}

impl RequestBody {
    /// Content type header implied by the body, if any.
    pub fn content_type(&self) -> Option<String> {
        match self {
            RequestBody::Bytes(_) => None,
            RequestBody::Form(form) => Some(form.content_type_header()),
        }
    }

    /// Encodes the body.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            RequestBody::Bytes(bytes) => bytes.clone(),
            RequestBody::Form(form) => form.to_bytes(),
        }
    }
}

/// One field of a form submission.
#[derive(Debug, Clone)]
pub struct FormPart {
    /// Field name.
    pub name: String,
    /// File name, for file fields.
    pub filename: Option<String>,
    /// Content type, for file fields.
    pub content_type: Option<String>,
    /// Field value.
    pub data: Bytes,
}

/// `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct FormData {
    parts: Vec<FormPart>,
    boundary: String,
}

impl FormData {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self {
            parts: Vec::new(),
            boundary: Self::generate_boundary(),
        }
    }

    fn generate_boundary() -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        format!("----DriveIntakeBoundary{}", suffix)
    }

    /// Adds a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            filename: None,
            content_type: None,
            data: Bytes::from(value.into()),
        });
        self
    }

    /// Adds a file field.
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Bytes,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(part_content_type(&content_type.into())),
            data,
        });
        self
    }

    /// Fields in insertion order.
    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    /// Looks up a field by name.
    pub fn part(&self, name: &str) -> Option<&FormPart> {
        self.parts.iter().find(|p| p.name == name)
    }

    /// Converts to bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut result = Vec::new();

        for part in &self.parts {
            result.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());

            let mut disposition = format!(
                "Content-Disposition: form-data; name=\"{}\"",
                escape_quoted(&part.name)
            );
            if let Some(filename) = &part.filename {
                disposition.push_str(&format!("; filename=\"{}\"", escape_quoted(filename)));
            }
            result.extend_from_slice(disposition.as_bytes());
            result.extend_from_slice(b"\r\n");

            if let Some(content_type) = &part.content_type {
                result.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
            }
            result.extend_from_slice(b"\r\n");
            result.extend_from_slice(&part.data);
            result.extend_from_slice(b"\r\n");
        }

        result.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());

        Bytes::from(result)
    }

    /// Gets the content type header value.
    pub fn content_type_header(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

impl Default for FormData {
    fn default() -> Self {
        Self::new()
    }
}

/// Content type safe to place in a part header; anything unparseable becomes
/// `application/octet-stream`.
fn part_content_type(value: &str) -> String {
    let value = value.trim();
    if value.chars().any(char::is_control) {
        return mime::APPLICATION_OCTET_STREAM.to_string();
    }
    value
        .parse::<mime::Mime>()
        .map(|m| m.to_string())
        .unwrap_or_else(|_| mime::APPLICATION_OCTET_STREAM.to_string())
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// HTTP response representation.
#[derive(Debug)]
pub struct HttpResponse {
    /// Response status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Creates a new HTTP response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Body as lossy UTF-8, truncated for error messages.
    pub fn body_snippet(&self) -> String {
        const LIMIT: usize = 512;
        let text = String::from_utf8_lossy(&self.body);
        if text.len() > LIMIT {
            let mut end = LIMIT;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &text[..end])
        } else {
            text.into_owned()
        }
    }
}

/// Reqwest-based HTTP transport implementation.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a new reqwest transport.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a transport with the timeouts and user agent from `config`.
    pub fn from_config(config: &DriveIntakeConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Http(format!("Failed to create client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method: Method = request.method.into();
        let mut req = self.client.request(method, request.url.clone());

        // Add headers
        for (key, value) in request.headers.iter() {
            req = req.header(key, value);
        }

        // Add timeout
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        // Add body
        if let Some(body) = request.body {
            if let Some(content_type) = body.content_type() {
                req = req.header("Content-Type", content_type);
            }
            req = req.body(body.to_bytes());
        }

        let response = req.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(HttpResponse::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_form_data_encoding() {
        let form = FormData::new()
            .file(
                "file",
                "report \"q1\".pdf",
                "application/pdf",
                Bytes::from_static(b"%PDF-1.4"),
            )
            .text("source", "google_drive");

        let body = String::from_utf8(form.to_bytes().to_vec()).unwrap();
        let boundary = form.content_type_header()
            .trim_start_matches("multipart/form-data; boundary=")
            .to_string();

        assert!(body.starts_with(&format!("--{}\r\n", boundary)));
        assert!(body.ends_with(&format!("--{}--\r\n", boundary)));
        assert!(body.contains("name=\"file\"; filename=\"report %22q1%22.pdf\""));
        assert!(body.contains("Content-Type: application/pdf\r\n\r\n%PDF-1.4\r\n"));
        assert!(body.contains("name=\"source\"\r\n\r\ngoogle_drive\r\n"));
        assert_eq!(form.part("source").unwrap().data, Bytes::from("google_drive"));
    }

    #[test]
    fn test_injected_content_type_cannot_split_headers() {
        let form = FormData::new().file(
            "file",
            "a.txt",
            "text/plain\r\nX-Injected: 1",
            Bytes::from_static(b"abc"),
        );

        let body = String::from_utf8(form.to_bytes().to_vec()).unwrap();

        assert!(!body.contains("X-Injected"));
        assert!(body.contains("Content-Type: application/octet-stream\r\n\r\nabc\r\n"));
        assert_eq!(
            form.part("file").unwrap().content_type.as_deref(),
            Some("application/octet-stream")
        );
    }

    #[test]
    fn test_content_type_with_parameters_is_kept() {
        let form = FormData::new().file("file", "a.csv", "text/csv; charset=utf-8", Bytes::new());
        assert_eq!(
            form.part("file").unwrap().content_type.as_deref(),
            Some("text/csv; charset=utf-8")
        );
    }

    #[test]
    fn test_boundaries_differ() {
        assert_ne!(FormData::new().boundary, FormData::new().boundary);
    }

    #[test]
    fn test_body_snippet_truncates() {
        let response = HttpResponse::new(
            StatusCode::BAD_REQUEST,
            HeaderMap::new(),
            Bytes::from("x".repeat(2000)),
        );
        assert!(response.body_snippet().len() < 600);
    }

    #[tokio::test]
    async fn test_reqwest_transport_sends_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/upload"))
            .and(header("x-test", "1"))
            .respond_with(ResponseTemplate::new(201).set_body_string("{\"file_id\":\"f-1\"}"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let mut request = HttpRequest::new(
            HttpMethod::Post,
            Url::parse(&format!("{}/files/upload", server.uri())).unwrap(),
        );
        request.headers.insert("x-test", "1".parse().unwrap());
        request.body = Some(RequestBody::Form(FormData::new().text("source", "google_drive")));

        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.body, Bytes::from("{\"file_id\":\"f-1\"}"));

        let received = server.received_requests().await.unwrap();
        let content_type = received[0].headers.get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
    }
}
