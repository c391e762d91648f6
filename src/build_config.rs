//! Build configuration model seen by the decorator
//!
//! The build tool owns these values and drives their hooks: it resolves a
//! `ConfigSource` into a `BuildConfig`, awaits the rewrites hook, then runs
//! the synchronous transform hook over its bundler configuration.

use crate::error::QueryCacheResult;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Phase the build tool is constructing a configuration for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    DevelopmentServer,
    ProductionBuild,
    ProductionServer,
    Export,
}

/// Arguments handed to configuration factories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigContext {
    pub phase: Phase,
}

impl ConfigContext {
    pub fn new(phase: Phase) -> Self {
        Self { phase }
    }
}

/// Arguments handed to rewrites hooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteContext {
    pub phase: Phase,
    pub base_path: String,
}

impl RewriteContext {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            base_path: String::new(),
        }
    }
}

/// Arguments handed to transform hooks alongside the bundler config
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformContext {
    pub build_id: String,
    pub dev: bool,
    pub is_server: bool,
}

/// A single path rewrite returned by the rewrites hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    pub source: String,
    pub destination: String,
}

/// Async-capable hook returning the build's rewrites
pub type RewritesHook = Arc<
    dyn Fn(RewriteContext) -> BoxFuture<'static, QueryCacheResult<Vec<Rewrite>>> + Send + Sync,
>;

/// Synchronous hook mutating the bundler configuration
pub type TransformHook = Arc<
    dyn Fn(BundlerConfig, &TransformContext) -> QueryCacheResult<BundlerConfig> + Send + Sync,
>;

/// Factory producing a build configuration for a phase
pub type ConfigFactory = Arc<dyn Fn(&ConfigContext) -> BuildConfig + Send + Sync>;

/// Build-tool configuration
///
/// `settings` holds every field this crate does not touch; it passes through
/// decoration unchanged.
#[derive(Clone, Default)]
pub struct BuildConfig {
    pub settings: Map<String, Value>,
    pub rewrites: Option<RewritesHook>,
    pub transform: Option<TransformHook>,
}

impl BuildConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    pub fn with_rewrites<F>(mut self, hook: F) -> Self
    where
        F: Fn(RewriteContext) -> BoxFuture<'static, QueryCacheResult<Vec<Rewrite>>>
            + Send
            + Sync
            + 'static,
    {
        self.rewrites = Some(Arc::new(hook));
        self
    }

    pub fn with_transform<F>(mut self, hook: F) -> Self
    where
        F: Fn(BundlerConfig, &TransformContext) -> QueryCacheResult<BundlerConfig>
            + Send
            + Sync
            + 'static,
    {
        self.transform = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildConfig")
            .field("settings", &self.settings)
            .field("rewrites", &self.rewrites.is_some())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// A configuration value or a factory producing one
#[derive(Clone)]
pub enum ConfigSource {
    Value(BuildConfig),
    Factory(ConfigFactory),
}

impl ConfigSource {
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&ConfigContext) -> BuildConfig + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(f))
    }

    /// Produce the configuration for `ctx`
    pub fn resolve(&self, ctx: &ConfigContext) -> BuildConfig {
        match self {
            Self::Value(config) => config.clone(),
            Self::Factory(factory) => factory(ctx),
        }
    }

    /// View this source as a factory, wrapping plain values
    pub fn into_factory(self) -> ConfigFactory {
        match self {
            Self::Factory(factory) => factory,
            Self::Value(config) => Arc::new(move |_: &ConfigContext| config.clone()),
        }
    }
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self::Value(BuildConfig::default())
    }
}

impl From<BuildConfig> for ConfigSource {
    fn from(config: BuildConfig) -> Self {
        Self::Value(config)
    }
}

impl From<Option<BuildConfig>> for ConfigSource {
    fn from(config: Option<BuildConfig>) -> Self {
        Self::Value(config.unwrap_or_default())
    }
}

impl fmt::Debug for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(config) => f.debug_tuple("Value").field(config).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Capability of a plugin that injects compile-time constants
pub trait DefineValues {
    /// Constant name to JSON-serialized value
    fn definitions_mut(&mut self) -> &mut BTreeMap<String, String>;
}

/// Entry in the bundler's plugin list
pub trait BundlerPlugin: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// The define-values capability, if this plugin has one
    fn define_values_mut(&mut self) -> Option<&mut dyn DefineValues> {
        None
    }
}

/// Stock define-values plugin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinePlugin {
    pub definitions: BTreeMap<String, String>,
}

impl DefinePlugin {
    pub fn new(definitions: BTreeMap<String, String>) -> Self {
        Self { definitions }
    }
}

impl DefineValues for DefinePlugin {
    fn definitions_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.definitions
    }
}

impl BundlerPlugin for DefinePlugin {
    fn name(&self) -> &str {
        "DefinePlugin"
    }

    fn define_values_mut(&mut self) -> Option<&mut dyn DefineValues> {
        Some(self)
    }
}

/// Bundler configuration passed through transform hooks
#[derive(Debug, Default)]
pub struct BundlerConfig {
    pub plugins: Option<Vec<Box<dyn BundlerPlugin>>>,
    pub settings: Map<String, Value>,
}

impl BundlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugin(mut self, plugin: impl BundlerPlugin + 'static) -> Self {
        self.plugins_mut().push(Box::new(plugin));
        self
    }

    /// The plugin list, created empty if absent
    pub fn plugins_mut(&mut self) -> &mut Vec<Box<dyn BundlerPlugin>> {
        self.plugins.get_or_insert_with(Vec::new)
    }

    /// First plugin exposing the define-values capability
    pub fn define_values_mut(&mut self) -> Option<&mut dyn DefineValues> {
        self.plugins_mut()
            .iter_mut()
            .find_map(|plugin| plugin.define_values_mut())
    }
}
