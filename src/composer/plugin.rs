//! Plugin contract and registry.
//!
//! A manifest names plugins; the registry turns each name into a factory
//! that receives the plugin's options and returns a running plugin.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use serde_json::Value;

use crate::error::BoxError;
use crate::plugins::health::HealthPlugin;

/// What a factory sees when its plugin is composed.
#[derive(Debug, Clone, Copy)]
pub struct PluginContext<'a> {
    /// Name the plugin is registered under.
    pub name: &'a str,
    /// The plugin's manifest entry.
    pub options: &'a Value,
    /// Pack-level application settings.
    pub app: &'a Value,
}

/// A unit of server functionality: routes plus startup and teardown hooks.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Routes contributed to every server the plugin is selected for.
    fn router(&self) -> Router;

    /// Runs on every start, after listeners are bound.
    async fn on_start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Runs on every stop, after connections are drained.
    async fn on_stop(&self) {}
}

/// Builds a plugin from its manifest entry.
pub type PluginFactory =
    Arc<dyn Fn(&PluginContext<'_>) -> Result<Arc<dyn Plugin>, BoxError> + Send + Sync>;

/// Named plugin factories available to the composer.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in plugins (`health`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("health", |ctx| {
            Ok(Arc::new(HealthPlugin::from_options(ctx.options)?) as Arc<dyn Plugin>)
        });
        registry
    }

    /// Register a factory, replacing any previous one with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&PluginContext<'_>) -> Result<Arc<dyn Plugin>, BoxError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn get(&self, name: &str) -> Option<&PluginFactory> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
