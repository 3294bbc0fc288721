//! phx-react headless runtime binary.
//!
//! # Usage
//!
//! ```bash
//! # Mount a page rendered by a local server
//! phx-react --origin http://localhost:4000 \
//!     --page-key users --page-module App.UsersPage \
//!     --session-id s1 --token t1 --initial-state '{"users":[]}' \
//!     --page-endpoint /phx_react/page --action-endpoint /phx_react/action \
//!     --csrf-token abc
//! ```
//!
//! Then type commands on stdin, e.g. `action create_user {"name":"A"}`.

use std::time::Duration;

use clap::Parser;
use phx_react_app::{Bootstrap, DocumentAttributes, Runtime, RuntimeConfig, attributes};
use phx_react_cli::{CliError, Command, NetDriver, command::USAGE, view};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Headless phx-react runtime
#[derive(Parser, Debug)]
#[command(name = "phx-react")]
#[command(about = "Mount a server-driven phx-react page and drive it from stdin")]
#[command(version)]
struct Args {
    /// Page key of the mounted page
    #[arg(long)]
    page_key: Option<String>,

    /// Component key (defaults to the page key)
    #[arg(long)]
    component_key: Option<String>,

    /// Server page module
    #[arg(long)]
    page_module: Option<String>,

    /// Session id issued with the page
    #[arg(long)]
    session_id: Option<String>,

    /// Join and action token issued with the page
    #[arg(long)]
    token: Option<String>,

    /// JSON-encoded initial state
    #[arg(long)]
    initial_state: Option<String>,

    /// Page endpoint, absolute or relative to --origin
    #[arg(long)]
    page_endpoint: Option<String>,

    /// Action endpoint, absolute or relative to --origin
    #[arg(long)]
    action_endpoint: Option<String>,

    /// Anti-forgery token
    #[arg(long)]
    csrf_token: Option<String>,

    /// Anti-forgery token as found in the page's csrf-token meta tag
    #[arg(long)]
    csrf_meta: Option<String>,

    /// Channel socket URL
    #[arg(long, default_value = "ws://localhost:4000/phx_react/websocket")]
    socket_url: String,

    /// Origin that relative endpoints resolve against
    #[arg(long)]
    origin: Option<Url>,

    /// Channel topic namespace
    #[arg(long, default_value = "phx_react")]
    namespace: String,

    /// Heartbeat interval in seconds
    #[arg(long, default_value = "30")]
    heartbeat_secs: u64,

    /// Join timeout in seconds
    #[arg(long, default_value = "10")]
    join_timeout_secs: u64,

    /// Do not refresh and rejoin after the socket drops
    #[arg(long)]
    no_rejoin: bool,

    /// Extra component keys or page modules to render
    #[arg(long = "view")]
    views: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn document(&self) -> DocumentAttributes {
        let fields = [
            (attributes::PAGE_KEY, &self.page_key),
            (attributes::COMPONENT_KEY, &self.component_key),
            (attributes::PAGE_MODULE, &self.page_module),
            (attributes::SESSION_ID, &self.session_id),
            (attributes::TOKEN, &self.token),
            (attributes::INITIAL_STATE, &self.initial_state),
            (attributes::PAGE_ENDPOINT, &self.page_endpoint),
            (attributes::ACTION_ENDPOINT, &self.action_endpoint),
            (attributes::CSRF_TOKEN, &self.csrf_token),
        ];

        let mut doc = DocumentAttributes::new();
        for (name, value) in fields {
            if let Some(value) = value {
                doc = doc.with_data(name, value.as_str());
            }
        }
        if let Some(meta) = &self.csrf_meta {
            doc = doc.with_meta(attributes::CSRF_META, meta.as_str());
        }
        doc
    }

    fn config(&self) -> RuntimeConfig {
        RuntimeConfig {
            socket_url: self.socket_url.clone(),
            origin: self.origin.clone(),
            namespace: self.namespace.clone(),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            join_timeout: Duration::from_secs(self.join_timeout_secs),
            rejoin_on_drop: !self.no_rejoin,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let doc = args.document();
    let config = args.config();
    let bootstrap = Bootstrap::read(&doc).inspect_err(|e| {
        tracing::error!(error = %e, "missing or malformed bootstrap data, not mounting");
    })?;

    let driver = NetDriver::new(&config, &bootstrap)?;
    let mut keys = vec![bootstrap.page.component_key.clone(), bootstrap.page.page_module.clone()];
    keys.extend(args.views.iter().cloned());
    let runtime = Runtime::mount(driver, config, &doc, view::registry(keys))?;

    let handle = runtime.handle();
    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, unmounting");
            ctrl_c.unmount();
        }
    });

    tokio::spawn(async move {
        tracing::info!("{USAGE}");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match Command::parse(&line) {
                    Ok(command) => {
                        if !command.dispatch(&handle) {
                            break;
                        }
                    },
                    Err(phx_react_cli::ParseError::Empty) => {},
                    Err(e) => tracing::warn!(error = %e, "bad command"),
                },
                Ok(None) => {
                    tracing::info!("stdin closed, unmounting");
                    handle.unmount();
                    break;
                },
                Err(e) => {
                    tracing::error!(error = %e, "reading stdin failed");
                    handle.unmount();
                    break;
                },
            }
        }
    });

    runtime.run().await?;
    tracing::info!("runtime stopped");
    Ok(())
}
