//! Action client.
//!
//! Submits a named action for the current page session and resolves the
//! three-way envelope. Stateless: every call carries the full authorization
//! context in its body.

use phx_react_proto::{ActionEnvelope, ActionRequest};
use url::Url;

use crate::{ClientError, HttpClient, HttpRequest, Method, Navigator};

/// Submits actions to the action endpoint.
#[derive(Debug, Clone)]
pub struct ActionClient {
    endpoint: Url,
    csrf_token: String,
}

impl ActionClient {
    /// Create a client for `endpoint`, sending `csrf_token` with every call.
    pub fn new(endpoint: Url, csrf_token: impl Into<String>) -> Self {
        Self { endpoint, csrf_token: csrf_token.into() }
    }

    /// Action endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Build the POST request for `body`.
    pub fn request(&self, body: &ActionRequest) -> Result<HttpRequest, ClientError> {
        let bytes = serde_json::to_vec(body).map_err(|e| ClientError::Encode(e.to_string()))?;
        Ok(HttpRequest {
            method: Method::Post,
            url: self.endpoint.clone(),
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("accept".to_string(), "application/json".to_string()),
                ("x-csrf-token".to_string(), self.csrf_token.clone()),
            ],
            body: Some(bytes),
        })
    }

    /// Parse a response body. The HTTP status code is not consulted: error
    /// envelopes arrive with 4xx codes and are still envelopes.
    pub fn parse(body: &[u8]) -> Result<ActionEnvelope, ClientError> {
        serde_json::from_slice(body).map_err(|e| ClientError::MalformedResponse(e.to_string()))
    }

    /// Submit `body` and return its envelope.
    ///
    /// A redirect envelope triggers `navigator` before it is returned.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Http`] if the request cannot be completed
    /// - [`ClientError::MalformedResponse`] if the body is not an envelope
    pub async fn invoke<H, N>(
        &self,
        http: &H,
        navigator: &N,
        body: &ActionRequest,
    ) -> Result<ActionEnvelope, ClientError>
    where
        H: HttpClient,
        N: Navigator + ?Sized,
    {
        let request = self.request(body)?;
        tracing::debug!(action = %body.action, page_key = %body.page_key, "submitting action");

        let response = http.send(request).await?;
        let envelope = Self::parse(&response.body)?;
        tracing::debug!(action = %body.action, status = envelope.status(), http_status = response.status, "action resolved");

        if let ActionEnvelope::Redirect { to } = &envelope {
            tracing::info!(action = %body.action, to = %to, "action redirect");
            navigator.navigate(to);
        }
        Ok(envelope)
    }
}
