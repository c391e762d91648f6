//! query-cache - lazily started caching proxy for build-time fetches
//!
//! Decorates a build configuration so the build's async rewrites hook starts
//! a local caching proxy exactly once, and its synchronous transform hook
//! injects the proxy's port as a compile-time constant.

pub mod build_config;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handler;
pub mod plugin;
pub mod port_state;

pub use build_config::{
    BuildConfig, BundlerConfig, BundlerPlugin, ConfigContext, ConfigSource, DefinePlugin,
    DefineValues, Phase, Rewrite, RewriteContext, TransformContext,
};
pub use coordinator::PortCoordinator;
pub use error::{QueryCacheError, QueryCacheResult};
pub use plugin::{QueryCacheOptions, QueryCachePlugin, PORT_DEFINE_KEY};
pub use port_state::{PortCell, PortState};
