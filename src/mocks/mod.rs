//! Mock implementations for testing.
//!
//! This module provides a scripted HTTP transport and doubles for every host
//! surface so providers and the upload bridge can be exercised without a
//! browser or network.

mod host;

pub use host::{
    session_grant, PickerScript, RecordingLoader, ScriptedPicker, ScriptedPrompt,
    ScriptedSession, ScriptedTokenClient, TokenScript,
};

use crate::errors::TransportError;
use crate::transport::{FormData, HttpMethod, HttpRequest, HttpResponse, HttpTransport, RequestBody};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// A request captured by [`MockHttpTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Full URL.
    pub url: String,
    /// Headers with lowercase names, including the body content type.
    pub headers: HashMap<String, String>,
    /// Encoded body.
    pub body: Bytes,
    /// Form fields, when the body was a form.
    pub form: Option<FormData>,
}

impl RecordedRequest {
    fn capture(request: &HttpRequest) -> Self {
        let mut headers: HashMap<String, String> = request
            .headers
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();

        let (body, form) = match &request.body {
            Some(body) => {
                if let Some(content_type) = body.content_type() {
                    headers.insert("content-type".to_string(), content_type);
                }
                let form = match body {
                    RequestBody::Form(form) => Some(form.clone()),
                    RequestBody::Bytes(_) => None,
                };
                (body.to_bytes(), form)
            }
            None => (Bytes::new(), None),
        };

        Self {
            method: request.method,
            url: request.url.to_string(),
            headers,
            body,
            form,
        }
    }

    /// Text value of a form field.
    pub fn form_text(&self, name: &str) -> Option<String> {
        let part = self.form.as_ref()?.part(name)?;
        Some(String::from_utf8_lossy(&part.data).into_owned())
    }
}

/// Mock HTTP transport for testing.
///
/// Responses are returned in the order they were enqueued; every request is
/// recorded for later inspection.
///
/// # Example
///
/// ```
/// use integrations_drive_intake::mocks::MockHttpTransport;
///
/// let transport = MockHttpTransport::new();
/// transport.enqueue_json_response(200, r#"{"file_id": "42"}"#);
/// transport.verify_request_count(0);
/// ```
pub struct MockHttpTransport {
    responses: Arc<Mutex<VecDeque<Result<HttpResponse, TransportError>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttpTransport {
    /// Create a new mock HTTP transport.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Enqueue a response to be returned by the next request.
    pub fn enqueue_response(&self, response: Result<HttpResponse, TransportError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Enqueue a JSON response with the given status code and body.
    pub fn enqueue_json_response(&self, status: u16, body: &str) {
        self.enqueue_bytes(status, "application/json", body.as_bytes().to_vec());
    }

    /// Enqueue a response with a content type and raw body.
    pub fn enqueue_bytes(&self, status: u16, content_type: &str, body: Vec<u8>) {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(CONTENT_TYPE, value);
        }
        self.enqueue_response(Ok(HttpResponse::new(
            status_code(status),
            headers,
            Bytes::from(body),
        )));
    }

    /// Enqueue a plain-text response, typically an error status.
    pub fn enqueue_status(&self, status: u16, body: &str) {
        self.enqueue_bytes(status, "text/plain", body.as_bytes().to_vec());
    }

    /// Enqueue a transport failure.
    pub fn enqueue_error(&self, error: TransportError) {
        self.enqueue_response(Err(error));
    }

    /// Get all requests that were made.
    pub fn get_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the last request that was made.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Number of requests made so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Verify that exactly `expected` requests were made.
    pub fn verify_request_count(&self, expected: usize) {
        let actual = self.request_count();
        assert_eq!(actual, expected, "Expected {} requests, got {}", expected, actual);
    }

    /// Verify that a request was made with the expected method and URL.
    pub fn verify_request(&self, index: usize, method: HttpMethod, url_contains: &str) {
        let requests = self.requests.lock().unwrap();
        assert!(index < requests.len(), "No request at index {}", index);

        let request = &requests[index];
        assert_eq!(request.method, method, "Expected method {:?}, got {:?}", method, request.method);
        assert!(
            request.url.contains(url_contains),
            "Expected URL to contain '{}', got '{}'",
            url_contains,
            request.url
        );
    }

    /// Verify that a request carried a specific header.
    pub fn verify_header(&self, index: usize, header_name: &str, header_value: &str) {
        let requests = self.requests.lock().unwrap();
        assert!(index < requests.len(), "No request at index {}", index);

        let actual_value = requests[index].headers.get(&header_name.to_ascii_lowercase());
        assert_eq!(
            actual_value,
            Some(&header_value.to_string()),
            "Expected header '{}' to be '{}', got {:?}",
            header_name,
            header_value,
            actual_value
        );
    }
}

impl Default for MockHttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push(RecordedRequest::capture(&request));

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::Network(
                    "No response configured in MockHttpTransport".into(),
                ))
            })
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
