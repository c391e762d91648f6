//! Build-config decorator
//!
//! `QueryCachePlugin::decorate` wraps a build configuration so that:
//! - its rewrites hook starts the cache server (once) and records the port,
//! - its transform hook injects that port into the define-values plugin as
//!   `process.env.NEXT_QUERY_CACHE_PORT`.
//!
//! The build tool must await rewrites before running transform. That order is
//! not enforced here; running transform first fails with `PortNotReady`.

use crate::build_config::{
    BuildConfig, BundlerConfig, ConfigContext, ConfigSource, Rewrite, RewriteContext,
    RewritesHook, TransformContext, TransformHook,
};
use crate::config::Config;
use crate::coordinator::PortCoordinator;
use crate::error::{QueryCacheError, QueryCacheResult};
use crate::handler::{CacheKeyStrategy, Fetcher};
use crate::port_state::{PortCell, PortState};
use futures_util::future::BoxFuture;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Define key the build output reads the cache server port from
pub const PORT_DEFINE_KEY: &str = "process.env.NEXT_QUERY_CACHE_PORT";

/// Options for a plugin instance
#[derive(Clone)]
pub struct QueryCacheOptions {
    /// Preferred listen port, 0 lets the OS choose
    pub port: u16,
    pub host: IpAddr,
    /// Pass configurations through untouched and never start the server
    pub disabled: bool,
    /// Replacement upstream fetcher
    pub fetch: Option<Arc<dyn Fetcher>>,
    /// Replacement cache key derivation
    pub calculate_cache_key: Option<Arc<dyn CacheKeyStrategy>>,
    /// Timeout for the default fetcher
    pub fetch_timeout: Duration,
}

impl Default for QueryCacheOptions {
    fn default() -> Self {
        Self {
            port: 0,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            disabled: false,
            fetch: None,
            calculate_cache_key: None,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl QueryCacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options from the on-disk configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.server.port,
            host: config.server.host,
            disabled: config.plugin.disabled,
            fetch_timeout: Duration::from_secs(config.fetch.timeout_secs),
            ..Self::default()
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn fetch(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetch = Some(fetcher);
        self
    }

    pub fn calculate_cache_key(mut self, strategy: Arc<dyn CacheKeyStrategy>) -> Self {
        self.calculate_cache_key = Some(strategy);
        self
    }
}

/// State shared by every configuration one plugin instance decorates
struct Shared {
    coordinator: PortCoordinator,
    port: PortCell,
}

/// A plugin instance: one cache server, one port handshake
pub struct QueryCachePlugin {
    disabled: bool,
    shared: Arc<Shared>,
}

impl QueryCachePlugin {
    pub fn new(options: QueryCacheOptions) -> Self {
        Self {
            disabled: options.disabled,
            shared: Arc::new(Shared {
                coordinator: PortCoordinator::new(&options),
                port: PortCell::new(),
            }),
        }
    }

    /// Build a plugin around an existing coordinator
    pub fn with_coordinator(coordinator: PortCoordinator) -> Self {
        Self {
            disabled: false,
            shared: Arc::new(Shared {
                coordinator,
                port: PortCell::new(),
            }),
        }
    }

    /// Current state of the port handshake
    pub fn port_state(&self) -> PortState {
        self.shared.port.state()
    }

    pub fn coordinator(&self) -> &PortCoordinator {
        &self.shared.coordinator
    }

    /// Wrap `original` so its hooks start the server and inject its port
    pub fn decorate(&self, original: impl Into<ConfigSource>) -> ConfigSource {
        let original = original.into();
        if self.disabled {
            debug!("Query cache disabled, config passed through");
            return original;
        }

        let factory = original.into_factory();
        let shared = Arc::clone(&self.shared);

        ConfigSource::factory(move |ctx: &ConfigContext| {
            let base = factory(ctx);
            let rewrites = wrap_rewrites(Arc::clone(&shared), base.rewrites.clone());
            let transform = wrap_transform(Arc::clone(&shared), base.transform.clone());

            BuildConfig {
                rewrites: Some(rewrites),
                transform: Some(transform),
                ..base
            }
        })
    }
}

// Rewrites is hijacked because it is the hook allowed to be async; the build
// tool resolves it before the transform hook runs.
fn wrap_rewrites(shared: Arc<Shared>, base: Option<RewritesHook>) -> RewritesHook {
    Arc::new(move |ctx: RewriteContext| -> BoxFuture<'static, QueryCacheResult<Vec<Rewrite>>> {
        let shared = Arc::clone(&shared);
        let base = base.clone();
        Box::pin(async move {
            let port = shared.coordinator.ensure_started().await?;
            shared.port.resolve(port)?;
            debug!("Rewrites hook resolved port {}", port);

            match base {
                Some(hook) => hook(ctx).await,
                None => Ok(Vec::<Rewrite>::new()),
            }
        })
    })
}

fn wrap_transform(shared: Arc<Shared>, base: Option<TransformHook>) -> TransformHook {
    Arc::new(
        move |config: BundlerConfig, ctx: &TransformContext| -> QueryCacheResult<BundlerConfig> {
            let mut config = match &base {
                Some(hook) => hook(config, ctx)?,
                None => config,
            };

            let defines = config
                .define_values_mut()
                .ok_or(QueryCacheError::MissingCollaboratorPlugin)?;
            let port = shared.port.require()?;

            defines
                .definitions_mut()
                .insert(PORT_DEFINE_KEY.to_string(), serde_json::to_string(&port)?);
            debug!("Injected {} = {}", PORT_DEFINE_KEY, port);

            Ok(config)
        },
    )
}
