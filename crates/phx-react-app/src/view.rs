//! View registry and the context handed to render functions.
//!
//! The host application supplies an explicit table from component key to
//! render function. Lookup tries the page's component key first, then its
//! page module. A page with neither registered renders as
//! [`Rendered::NotFound`] instead of failing.

use std::{collections::HashMap, fmt};

use phx_react_client::ConnectionStatus;
use phx_react_proto::{PageIdentity, ViewState};

use crate::RuntimeHandle;

/// Render function producing a view of type `V`.
pub type RenderFn<V> = Box<dyn Fn(&ViewContext<'_>) -> V + Send + Sync>;

/// Read-only runtime contract passed to render functions.
///
/// Mutation goes through [`ViewContext::handle`]: events, actions, refreshes
/// and invalidations are requests to the runtime, never direct writes.
pub struct ViewContext<'a> {
    page: &'a PageIdentity,
    state: &'a ViewState,
    changed_keys: &'a [String],
    status: ConnectionStatus,
    error: Option<&'a str>,
    handle: &'a RuntimeHandle,
}

impl<'a> ViewContext<'a> {
    pub(crate) fn new(
        page: &'a PageIdentity,
        state: &'a ViewState,
        changed_keys: &'a [String],
        status: ConnectionStatus,
        error: Option<&'a str>,
        handle: &'a RuntimeHandle,
    ) -> Self {
        Self { page, state, changed_keys, status, error, handle }
    }

    /// Current page identity.
    pub fn page(&self) -> &'a PageIdentity {
        self.page
    }

    /// Current view state.
    pub fn state(&self) -> &'a ViewState {
        self.state
    }

    /// Keys the last state push reported as changed.
    pub fn changed_keys(&self) -> &'a [String] {
        self.changed_keys
    }

    /// Connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Connection error message.
    pub fn error(&self) -> Option<&'a str> {
        self.error
    }

    /// Handle for events, actions and refreshes.
    pub fn handle(&self) -> &'a RuntimeHandle {
        self.handle
    }
}

impl fmt::Debug for ViewContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewContext")
            .field("page", self.page)
            .field("status", &self.status)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Output of a render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered<V> {
    /// Registered view output.
    View(V),
    /// No view registered for the page.
    NotFound {
        /// Component key looked up first.
        component_key: String,
        /// Page module looked up second.
        page_module: String,
    },
}

/// Mapping from component key to render function.
pub struct ViewRegistry<V> {
    views: HashMap<String, RenderFn<V>>,
}

impl<V> Default for ViewRegistry<V> {
    fn default() -> Self {
        Self { views: HashMap::new() }
    }
}

impl<V> ViewRegistry<V> {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `render` under `key`, builder style.
    #[must_use]
    pub fn with<F>(mut self, key: impl Into<String>, render: F) -> Self
    where
        F: Fn(&ViewContext<'_>) -> V + Send + Sync + 'static,
    {
        self.register(key, render);
        self
    }

    /// Register `render` under `key`, replacing any previous entry.
    pub fn register<F>(&mut self, key: impl Into<String>, render: F)
    where
        F: Fn(&ViewContext<'_>) -> V + Send + Sync + 'static,
    {
        self.views.insert(key.into(), Box::new(render));
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.views.contains_key(key)
    }

    /// Render function for `page`: component key first, then page module.
    pub fn resolve(&self, page: &PageIdentity) -> Option<&RenderFn<V>> {
        self.views.get(&page.component_key).or_else(|| self.views.get(&page.page_module))
    }

    /// Render the page in `ctx`.
    pub fn render(&self, ctx: &ViewContext<'_>) -> Rendered<V> {
        let page = ctx.page();
        match self.resolve(page) {
            Some(render) => Rendered::View(render(ctx)),
            None => {
                tracing::warn!(
                    component_key = %page.component_key,
                    page_module = %page.page_module,
                    "no view registered for page"
                );
                Rendered::NotFound {
                    component_key: page.component_key.clone(),
                    page_module: page.page_module.clone(),
                }
            },
        }
    }
}

impl<V> fmt::Debug for ViewRegistry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.views.keys().collect();
        keys.sort();
        f.debug_struct("ViewRegistry").field("views", &keys).finish()
    }
}
