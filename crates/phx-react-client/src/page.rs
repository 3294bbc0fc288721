//! Page loader.
//!
//! Fetches the payload for a page key. Used for navigation and for
//! re-authorization of the current page.

use std::collections::BTreeMap;

use phx_react_proto::{PagePayload, PageResponse};
use url::Url;

use crate::{ClientError, HttpClient, HttpRequest, Method};

/// Query parameter carrying the current session id.
const SESSION_ID_PARAM: &str = "session_id";

/// Page fetch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    /// Page to load.
    pub page_key: String,
    /// Extra query parameters.
    pub params: BTreeMap<String, String>,
    /// Current session id, sent for continuity.
    pub session_id: String,
}

/// Loads page payloads from the page endpoint.
#[derive(Debug, Clone)]
pub struct PageLoader {
    endpoint: Url,
}

impl PageLoader {
    /// Create a loader for `endpoint`. Page keys are appended as a path segment.
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    /// Page endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Build the GET request for `query`.
    ///
    /// The page key is percent-encoded into one path segment. Query
    /// parameters follow in order, then `session_id`, which always carries
    /// the current session and replaces any caller-supplied value.
    pub fn request(&self, query: &PageQuery) -> Result<HttpRequest, ClientError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ClientError::InvalidUrl(format!("page endpoint cannot be a base: {}", self.endpoint))
            })?
            .pop_if_empty()
            .push(&query.page_key);

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &query.params {
                if key != SESSION_ID_PARAM {
                    pairs.append_pair(key, value);
                }
            }
            pairs.append_pair(SESSION_ID_PARAM, &query.session_id);
        }

        Ok(HttpRequest {
            method: Method::Get,
            url,
            headers: vec![("accept".to_string(), "application/json".to_string())],
            body: None,
        })
    }

    /// Parse a response body. Anything other than `status: "ok"` with a page
    /// is malformed.
    pub fn parse(body: &[u8]) -> Result<PagePayload, ClientError> {
        let response: PageResponse = serde_json::from_slice(body)
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;

        match response {
            PageResponse { status, page: Some(page) } if status == "ok" => Ok(page),
            PageResponse { status, .. } => Err(ClientError::MalformedResponse(format!(
                "page response status {status:?} without payload"
            ))),
        }
    }

    /// Fetch the payload for `query`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Http`] if the request cannot be completed
    /// - [`ClientError::MalformedResponse`] if the body is not an ok page response
    pub async fn load<H: HttpClient>(
        &self,
        http: &H,
        query: &PageQuery,
    ) -> Result<PagePayload, ClientError> {
        let request = self.request(query)?;
        tracing::debug!(page_key = %query.page_key, url = %request.url, "fetching page");

        let response = http.send(request).await?;
        let page = Self::parse(&response.body)?;
        tracing::debug!(page_key = %page.page_key, session_id = %page.session_id, "page loaded");
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> PageLoader {
        PageLoader::new(Url::parse("http://localhost:4000/phx_react/page").unwrap())
    }

    fn query(page_key: &str, params: &[(&str, &str)]) -> PageQuery {
        PageQuery {
            page_key: page_key.into(),
            params: params.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
            session_id: "s1".into(),
        }
    }

    #[test]
    fn request_appends_key_and_session() {
        let request = loader().request(&query("users", &[])).unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.url.as_str(), "http://localhost:4000/phx_react/page/users?session_id=s1");
        assert_eq!(request.header("accept"), Some("application/json"));
    }

    #[test]
    fn request_encodes_key_and_overrides_session_param() {
        let request = loader()
            .request(&query("team/users list", &[("page", "2"), ("session_id", "forged")]))
            .unwrap();
        assert_eq!(
            request.url.as_str(),
            "http://localhost:4000/phx_react/page/team%2Fusers%20list?page=2&session_id=s1"
        );
    }

    #[test]
    fn trailing_slash_endpoint_does_not_double_slash() {
        let loader = PageLoader::new(Url::parse("http://localhost:4000/phx_react/page/").unwrap());
        let request = loader.request(&query("users", &[])).unwrap();
        assert_eq!(request.url.path(), "/phx_react/page/users");
    }

    #[test]
    fn parse_requires_ok_status_and_page() {
        assert!(matches!(
            PageLoader::parse(br#"{"status":"error"}"#),
            Err(ClientError::MalformedResponse(_))
        ));
        assert!(matches!(
            PageLoader::parse(br#"{"status":"ok"}"#),
            Err(ClientError::MalformedResponse(_))
        ));
        assert!(matches!(PageLoader::parse(b"not json"), Err(ClientError::MalformedResponse(_))));
    }
}
