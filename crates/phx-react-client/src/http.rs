//! HTTP and navigation seams.
//!
//! The action client and page loader only build requests and parse
//! responses; executing a request goes through [`HttpClient`] so tests can
//! substitute an in-memory server.

use std::future::Future;

use url::Url;

use crate::ClientError;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

/// Outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL.
    pub url: Url,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// First value of the named header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Response with its raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body bytes.
    pub body: Vec<u8>,
}

/// Executes HTTP requests.
///
/// Implementations must send same-origin credentials (cookies) with every
/// request and must not retry.
pub trait HttpClient: Send + Sync {
    /// Send a request and read the whole response body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the request cannot be completed.
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, ClientError>> + Send;
}

/// Performs a full-page navigation, leaving the in-app state behind.
pub trait Navigator: Send + Sync {
    /// Navigate to `location`.
    fn navigate(&self, location: &str);
}
