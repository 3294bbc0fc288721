//! [`HttpClient`] over reqwest.

use std::future::Future;

use crate::{ClientError, HttpClient, HttpRequest, HttpResponse, Method};

/// Reqwest-backed HTTP client with a cookie store, so same-origin session
/// cookies are sent with every request.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Build a client with cookies enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, ClientError> {
        let inner = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl HttpClient for ReqwestClient {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, ClientError>> + Send {
        let client = self.inner.clone();
        async move {
            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
            };

            let mut builder = client.request(method, request.url);
            for (name, value) in request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(|e| ClientError::Http(e.to_string()))?;
            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(|e| ClientError::Http(e.to_string()))?;

            Ok(HttpResponse { status, body: body.to_vec() })
        }
    }
}
