//! miniweb - self-contained host diagnostics over HTTP
//!
//! A single-binary server exposing HTML dashboards and JSON endpoints for
//! kernel state: CPU, memory, load, processes, disks, routing tables, DNS
//! configuration, interface counters, manual pages and installed packages.
//!
//! # Architecture
//!
//! - **Engine** ([`server::engine`]): accept loop, fixed connection slot
//!   table with generation counters, pre-spawned worker tasks, dedicated
//!   503 responder, idle sweeper.
//! - **Router** ([`router`]): bounded static table, GET-only dynamic
//!   prefix rules, declarative view table.
//! - **Probe** ([`probe`]): every kernel fact behind one trait; `sysinfo`
//!   plus `/proc` parsing in production, canned snapshots in tests.
//! - **Samplers** ([`sampler`]): 1 Hz background collection into bounded
//!   rings, serving the history endpoints.
//! - **Template store and file cache** ([`tmpl`], [`fcache`]): startup-
//!   loaded page fragments; admission-controlled static file cache.
//! - **Executor** ([`exec`]): bounded subprocess capture for mandoc, man,
//!   apropos and pkg_info.
//!
//! The protocol surface is deliberately small: HTTP/1.x, one request per
//! connection, `Connection: close` on every response. The server expects
//! to sit behind a reverse proxy for TLS; forwarded-client headers are
//! honored only from the configured trusted proxy.

pub(crate) mod http {
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub mod engine;
    pub(crate) mod pool;
}
pub(crate) mod handlers {
    pub(crate) mod assets;
    pub(crate) mod man;
    pub(crate) mod metrics;
    pub(crate) mod networking;
    pub(crate) mod packages;
    pub(crate) mod views;
}
pub mod config;
pub(crate) mod errors;
pub(crate) mod exec;
pub(crate) mod fcache;
pub mod probe;
pub(crate) mod router;
pub(crate) mod sampler;
pub(crate) mod text;
pub(crate) mod tmpl;

pub use crate::{
    config::{Cli, Config},
    errors::StartupError,
    server::engine::serve,
};

use crate::{
    fcache::FileCache,
    probe::{PlatformProbe, SystemProbe},
    router::Router,
    sampler::{MetricSampler, NetworkSampler},
    tmpl::TemplateStore,
};
use std::sync::Arc;

/// Everything a handler can reach, assembled once at startup and shared
/// read-only across the workers. Each mutable component carries its own
/// lock; there are no hidden singletons.
pub struct AppState {
    pub config: Config,
    pub(crate) probe: Arc<dyn PlatformProbe>,
    pub(crate) templates: TemplateStore,
    pub(crate) fcache: FileCache,
    pub(crate) metrics: Arc<MetricSampler>,
    pub(crate) networking: Arc<NetworkSampler>,
    pub(crate) router: Router,
}

impl AppState {
    /// Production assembly with the system probe.
    pub fn new(config: Config) -> Result<Self, StartupError> {
        Self::with_probe(config, Arc::new(SystemProbe::new()))
    }

    pub fn with_probe(
        config: Config,
        probe: Arc<dyn PlatformProbe>,
    ) -> Result<Self, StartupError> {
        let templates = TemplateStore::load(&config.templates_dir)?;

        Ok(Self {
            config,
            probe,
            templates,
            fcache: FileCache::new(),
            metrics: Arc::new(MetricSampler::new()),
            networking: Arc::new(NetworkSampler::new()),
            router: Router::with_defaults(),
        })
    }
}
