//! HTTP client abstraction for making requests.
//!
//! This module defines the `HttpClient` trait to abstract HTTP request execution,
//! enabling testability with mock implementations.

use crate::error::{CoursefetchError, Result};
use crate::request::RequestSpec;
use async_trait::async_trait;
use std::time::Duration;

/// Response from an HTTP request.
///
/// The whole body is buffered; the sources only ever deal in small JSON documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Value of the Content-Type header, if the server sent one
    pub content_type: Option<String>,
    /// Response body as a string
    pub body: String,
}

impl HttpResponse {
    /// A response with an `application/json` content type.
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("application/json; charset=utf-8".to_string()),
            body: body.into(),
        }
    }

    /// A response with an arbitrary (or missing) content type.
    pub fn with_content_type(status: u16, content_type: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the content type names JSON (`application/json`, `...+json`).
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false)
    }
}

/// Trait for executing HTTP requests.
///
/// This abstraction allows for different implementations (production vs. testing)
/// and makes the fetch pipeline testable without making real HTTP calls.
///
/// # Example
/// ```ignore
/// let client = ReqwestHttpClient::new();
/// let response = client.execute(&RequestSpec::get(url), 5000).await?;
/// println!("Status: {}, Body: {}", response.status, response.body);
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// Execute an HTTP request.
    ///
    /// Only transport-level problems are errors here. Non-2xx statuses come back
    /// as a normal `HttpResponse`; judging them is the fetcher's job.
    ///
    /// # Errors
    /// Returns `CoursefetchError::Transport` if:
    /// - The request fails due to network issues
    /// - The request times out
    /// - The URL or method is invalid
    async fn execute(&self, request: &RequestSpec, timeout_ms: u64) -> Result<HttpResponse>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new reqwest-based HTTP client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Wrap an already configured reqwest client (proxies, user agent, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn execute(&self, request: &RequestSpec, timeout_ms: u64) -> Result<HttpResponse> {
        tracing::debug!(timeout_ms = timeout_ms, "Executing HTTP request");

        let method: reqwest::Method = request.method.parse().map_err(|e| {
            tracing::error!(method = %request.method, error = %e, "Invalid HTTP method");
            CoursefetchError::Transport(format!("Invalid HTTP method '{}': {}", request.method, e))
        })?;

        let mut req = self
            .client
            .request(method, &request.url)
            .timeout(Duration::from_millis(timeout_ms));

        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            let has_content_type = request
                .headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                req = req.header("Content-Type", "application/json");
            }
            req = req.body(body.clone());
            tracing::trace!(body_len = body.len(), "Added request body");
        }

        let response = req.send().await.map_err(|e| {
            tracing::warn!(error = %e, "HTTP request failed");
            CoursefetchError::from(e)
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        tracing::debug!(
            status = status,
            response_len = body.len(),
            "HTTP request completed"
        );

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

/// Mock HTTP client for testing.
///
/// Allows configuring predetermined responses for specific requests without
/// making actual HTTP calls.
///
/// # Example
/// ```ignore
/// let mock = MockHttpClient::new();
/// mock.add_response(
///     "GET https://api.example.com/courses",
///     Ok(HttpResponse::json(200, r#"{"results": []}"#)),
/// );
/// ```
#[derive(Clone)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<MockResponse>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

/// A mock response that can optionally wait for a trigger before completing.
enum MockResponse {
    /// Immediate response
    Immediate(Result<HttpResponse>),
    /// Response that waits for a trigger signal before completing
    Triggered {
        response: Result<HttpResponse>,
        trigger: oneshot::Receiver<()>,
    },
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout_ms: u64,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add a predetermined response for a specific method and URL.
    ///
    /// The key is formatted as "{method} {url}". Multiple responses can be
    /// added for the same key - they will be returned in FIFO order.
    pub fn add_response(&self, key: &str, response: Result<HttpResponse>) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(MockResponse::Immediate(response));
    }

    /// Add a 200 JSON response built from a `serde_json::Value`.
    pub fn add_json(&self, key: &str, body: &serde_json::Value) {
        self.add_response(key, Ok(HttpResponse::json(200, body.to_string())));
    }

    /// Add a response that will wait for a manual trigger before completing.
    ///
    /// Returns a sender that when triggered (by sending `()` or dropping) will
    /// cause the HTTP request to complete with the given response.
    pub fn add_response_with_trigger(
        &self,
        key: &str,
        response: Result<HttpResponse>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(MockResponse::Triggered {
                response,
                trigger: rx,
            });
        tx
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of calls made for one "{method} {url}" key.
    pub fn call_count_for(&self, key: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| format!("{} {}", call.method, call.url) == key)
            .count()
    }

    /// Get the number of requests currently in-flight (executing).
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: &RequestSpec, timeout_ms: u64) -> Result<HttpResponse> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        // Decrement even if the caller drops this future mid-flight
        let in_flight = self.in_flight.clone();
        let _guard = scopeguard::guard((), move |_| {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        self.calls.lock().push(MockCall {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            timeout_ms,
        });

        let key = request.key();
        let mock_response = {
            let mut responses = self.responses.lock();
            responses
                .get_mut(&key)
                .filter(|queue| !queue.is_empty())
                .map(|queue| queue.remove(0))
        };

        match mock_response {
            Some(MockResponse::Immediate(response)) => response,
            Some(MockResponse::Triggered { response, trigger }) => {
                // Proceed either way once the sender fires or is dropped
                let _ = trigger.await;
                response
            }
            // Unconfigured URLs behave like a refused connection
            None => Err(CoursefetchError::Transport(format!(
                "No mock response configured for {}",
                key
            ))),
        }
    }
}
