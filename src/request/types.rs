//! Core request types.

use serde::Serialize;

/// Everything needed to issue one HTTP request.
///
/// Cloned into each fetch task, so it carries owned data only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSpec {
    /// HTTP method (e.g., "POST", "GET")
    pub method: String,

    /// Absolute URL including any query string
    pub url: String,

    /// Extra headers, sent in order
    pub headers: Vec<(String, String)>,

    /// The request body as a JSON string
    pub body: Option<String>,
}

impl RequestSpec {
    /// A GET request with no headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// A POST request carrying a JSON body.
    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.to_string()),
        }
    }

    /// Append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Append a header only when a value is present.
    pub fn with_optional_header(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) if !value.is_empty() => self.with_header(name, value),
            _ => self,
        }
    }

    /// Key used by the mock client and in log lines: "{METHOD} {url}".
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

impl std::fmt::Display for RequestSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_json_serializes_body() {
        let request = RequestSpec::post_json(
            "https://api.example.com/search",
            &serde_json::json!({"page": 1}),
        )
        .with_header("Accept", "application/json");

        assert_eq!(request.method, "POST");
        assert_eq!(request.body.as_deref(), Some(r#"{"page":1}"#));
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.key(), "POST https://api.example.com/search");
    }

    #[test]
    fn test_optional_header_skips_missing_and_empty() {
        let request = RequestSpec::get("https://api.example.com")
            .with_optional_header("Authorization", None)
            .with_optional_header("Authorization", Some(""));
        assert!(request.headers.is_empty());

        let request = request.with_optional_header("Authorization", Some("Token token=abc"));
        assert_eq!(
            request.headers,
            vec![("Authorization".to_string(), "Token token=abc".to_string())]
        );
    }
}
