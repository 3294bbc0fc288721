//! Bootstrap data read once from the host document.
//!
//! The host renders the mount point with `data-*` attributes carrying the
//! initial page identity and endpoints. The anti-forgery token may instead
//! live in a document-level `csrf-token` meta tag.
//!
//! # Invariants
//!
//! - An empty attribute counts as missing.
//! - `componentKey` defaults to `pageKey`; every other field is required.
//! - `initialState` must decode to a JSON object.

use std::collections::HashMap;

use phx_react_proto::{PageIdentity, ViewState};
use serde_json::Value;

use crate::ConfigError;

/// Attribute names, in dataset (camel case) form.
pub mod attributes {
    /// Page key.
    pub const PAGE_KEY: &str = "pageKey";
    /// Component key, optional.
    pub const COMPONENT_KEY: &str = "componentKey";
    /// Server page module.
    pub const PAGE_MODULE: &str = "pageModule";
    /// Session id.
    pub const SESSION_ID: &str = "sessionId";
    /// Join and action token.
    pub const TOKEN: &str = "token";
    /// JSON-encoded initial state.
    pub const INITIAL_STATE: &str = "initialState";
    /// Base URL for page fetches.
    pub const PAGE_ENDPOINT: &str = "pageEndpoint";
    /// URL for action submission.
    pub const ACTION_ENDPOINT: &str = "actionEndpoint";
    /// Anti-forgery token.
    pub const CSRF_TOKEN: &str = "csrfToken";
    /// Name of the document-level meta tag holding the anti-forgery token.
    pub const CSRF_META: &str = "csrf-token";
}

/// Source of bootstrap attributes.
pub trait HostDocument {
    /// Value of the mount point's `data-*` attribute, by dataset name.
    fn data_attribute(&self, name: &str) -> Option<&str>;

    /// Content of the named document-level meta tag.
    fn meta_content(&self, name: &str) -> Option<&str>;
}

/// In-memory host document.
#[derive(Debug, Clone, Default)]
pub struct DocumentAttributes {
    data: HashMap<String, String>,
    meta: HashMap<String, String>,
}

impl DocumentAttributes {
    /// Empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a `data-*` attribute.
    #[must_use]
    pub fn with_data(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(name.into(), value.into());
        self
    }

    /// Set a meta tag.
    #[must_use]
    pub fn with_meta(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(name.into(), value.into());
        self
    }
}

impl HostDocument for DocumentAttributes {
    fn data_attribute(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(String::as_str)
    }

    fn meta_content(&self, name: &str) -> Option<&str> {
        self.meta.get(name).map(String::as_str)
    }
}

/// Validated bootstrap data.
#[derive(Debug, Clone, PartialEq)]
pub struct Bootstrap {
    /// Initial page identity.
    pub page: PageIdentity,
    /// Initial view state.
    pub initial_state: ViewState,
    /// Base URL for page fetches.
    pub page_endpoint: String,
    /// URL for action submission.
    pub action_endpoint: String,
    /// Anti-forgery token.
    pub csrf_token: String,
}

impl Bootstrap {
    /// Read and validate bootstrap data from `doc`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingField`] for the first absent required field
    /// - [`ConfigError::InvalidInitialState`] if the state blob is not a JSON
    ///   object
    pub fn read(doc: &impl HostDocument) -> Result<Self, ConfigError> {
        let page_key = required(doc, attributes::PAGE_KEY)?;
        let component_key = present(doc.data_attribute(attributes::COMPONENT_KEY))
            .unwrap_or(page_key)
            .to_string();
        let page_module = required(doc, attributes::PAGE_MODULE)?;
        let session_id = required(doc, attributes::SESSION_ID)?;
        let token = required(doc, attributes::TOKEN)?;
        let initial_state_json = required(doc, attributes::INITIAL_STATE)?;
        let page_endpoint = required(doc, attributes::PAGE_ENDPOINT)?;
        let action_endpoint = required(doc, attributes::ACTION_ENDPOINT)?;
        let csrf_token = present(doc.data_attribute(attributes::CSRF_TOKEN))
            .or_else(|| present(doc.meta_content(attributes::CSRF_META)))
            .ok_or(ConfigError::MissingField(attributes::CSRF_TOKEN))?;

        let initial_state = match serde_json::from_str::<Value>(initial_state_json) {
            Ok(Value::Object(state)) => state,
            Ok(other) => {
                return Err(ConfigError::InvalidInitialState(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )));
            },
            Err(e) => return Err(ConfigError::InvalidInitialState(e.to_string())),
        };

        Ok(Self {
            page: PageIdentity {
                page_key: page_key.to_string(),
                page_module: page_module.to_string(),
                component_key,
                session_id: session_id.to_string(),
                token: token.to_string(),
            },
            initial_state,
            page_endpoint: page_endpoint.to_string(),
            action_endpoint: action_endpoint.to_string(),
            csrf_token: csrf_token.to_string(),
        })
    }

    /// Initial state re-encoded as JSON, for diagnostics.
    pub fn initial_state_json(&self) -> String {
        Value::Object(self.initial_state.clone()).to_string()
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn required<'a>(doc: &'a impl HostDocument, name: &'static str) -> Result<&'a str, ConfigError> {
    present(doc.data_attribute(name)).ok_or(ConfigError::MissingField(name))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
