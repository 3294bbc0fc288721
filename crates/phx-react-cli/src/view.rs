//! Log-line views.
//!
//! A headless host has no component tree; every registered key renders the
//! same one-line summary of the page.

use phx_react_app::{ViewContext, ViewRegistry};
use phx_react_client::ConnectionStatus;
use phx_react_proto::{PageIdentity, ViewState};
use serde_json::Value;

/// Registry rendering [`summary`] for each of `keys`.
pub fn registry(keys: impl IntoIterator<Item = String>) -> ViewRegistry<String> {
    let mut views = ViewRegistry::new();
    for key in keys {
        views.register(key, summary);
    }
    views
}

/// Render the page in `ctx` as one line.
pub fn summary(ctx: &ViewContext<'_>) -> String {
    format_summary(ctx.page(), ctx.status(), ctx.error(), ctx.state())
}

/// `[status] page_key (component) {state}`, with the error appended if any.
pub fn format_summary(
    page: &PageIdentity,
    status: ConnectionStatus,
    error: Option<&str>,
    state: &ViewState,
) -> String {
    let state = Value::Object(state.clone());
    let mut line = format!("[{status}] {} ({}) {state}", page.page_key, page.component_key);
    if let Some(error) = error {
        line.push_str(" error: ");
        line.push_str(error);
    }
    line
}
