//! Page identity and the page bootstrap payload.

use serde::{Deserialize, Serialize};

use crate::ViewState;

/// Identity of the current page and its authorization context.
///
/// Issued by the server and replaced wholesale; never partially mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageIdentity {
    /// Page key (route-level identifier).
    pub page_key: String,
    /// Server module backing the page. Fallback view selector.
    pub page_module: String,
    /// Primary view selector.
    pub component_key: String,
    /// Session the page was issued under.
    pub session_id: String,
    /// Join and action credential.
    pub token: String,
}

impl PageIdentity {
    /// Whether `other` renders through the same page and view.
    ///
    /// Used to decide between reauthorizing in place and full replacement.
    pub fn same_page(&self, other: &PageIdentity) -> bool {
        self.page_key == other.page_key && self.component_key == other.component_key
    }
}

/// Page payload returned by the page endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagePayload {
    /// Page key.
    pub page_key: String,
    /// Server module backing the page.
    pub page_module: String,
    /// View selector.
    pub component_key: String,
    /// Session the page was issued under.
    pub session_id: String,
    /// Join and action credential.
    pub token: String,
    /// Channel topic the server expects the client to join.
    #[serde(default)]
    pub topic: String,
    /// Full initial state for the page.
    #[serde(default)]
    pub initial_state: ViewState,
}

impl PagePayload {
    /// Identity fields of this payload.
    pub fn identity(&self) -> PageIdentity {
        PageIdentity {
            page_key: self.page_key.clone(),
            page_module: self.page_module.clone(),
            component_key: self.component_key.clone(),
            session_id: self.session_id.clone(),
            token: self.token.clone(),
        }
    }
}

/// Envelope around [`PagePayload`] as sent by the page endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResponse {
    /// Always `"ok"` for a usable response.
    pub status: String,
    /// Payload, present when `status` is `"ok"`.
    #[serde(default)]
    pub page: Option<PagePayload>,
}
