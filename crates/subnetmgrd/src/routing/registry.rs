//! Name to engine mapping with a single active engine.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use super::{MinHopEngine, RoutingEngine};

/// Name of the engine used when a requested one is not registered.
pub const DEFAULT_ENGINE: &str = MinHopEngine::NAME;

/// Builds a fresh engine instance.
pub type EngineFactory = Arc<dyn Fn() -> Arc<dyn RoutingEngine> + Send + Sync>;

/// Registered routing engines and the currently active one.
pub struct RoutingEngineRegistry {
    factories: BTreeMap<String, EngineFactory>,
    active: Option<Arc<dyn RoutingEngine>>,
}

impl RoutingEngineRegistry {
    /// Creates an empty registry. Allocates nothing.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
            active: None,
        }
    }

    /// Creates a registry holding the built-in engines.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_builtin();
        registry
    }

    /// Registers the built-in engines unless a same-named engine exists.
    pub fn register_builtin(&mut self) {
        if !self.factories.contains_key(MinHopEngine::NAME) {
            self.register(MinHopEngine::NAME, || {
                Arc::new(MinHopEngine::new()) as Arc<dyn RoutingEngine>
            });
        }
    }

    /// Registers `factory` under `name`, replacing any earlier entry.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn RoutingEngine> + Send + Sync + 'static,
    {
        if self
            .factories
            .insert(name.to_string(), Arc::new(factory))
            .is_some()
        {
            warn!(engine = name, "Routing engine re-registered");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiates the engine registered as `name`.
    ///
    /// Unknown names fall back to the default engine; the substitution is
    /// logged. Never fails.
    pub fn select(&self, name: &str) -> Arc<dyn RoutingEngine> {
        if let Some(factory) = self.factories.get(name) {
            info!(engine = name, "Routing engine selected");
            return factory();
        }

        warn!(
            requested = name,
            fallback = DEFAULT_ENGINE,
            "Routing engine not registered, using default"
        );
        match self.factories.get(DEFAULT_ENGINE) {
            Some(factory) => factory(),
            None => Arc::new(MinHopEngine::new()),
        }
    }

    /// Selects `name` and makes it the active engine.
    pub fn open(&mut self, name: &str) -> Arc<dyn RoutingEngine> {
        let engine = self.select(name);
        self.swap(Arc::clone(&engine));
        engine
    }

    /// Installs `engine` as active and releases the outgoing one.
    ///
    /// Returns the name of the released engine, if there was one.
    pub fn swap(&mut self, engine: Arc<dyn RoutingEngine>) -> Option<String> {
        let outgoing = self.active.replace(engine)?;
        let name = outgoing.name().to_string();
        outgoing.release();
        info!(engine = %name, "Routing engine released");
        Some(name)
    }

    pub fn active(&self) -> Option<Arc<dyn RoutingEngine>> {
        self.active.clone()
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref().map(RoutingEngine::name)
    }

    /// Releases the active engine, leaving none active.
    pub fn release_active(&mut self) {
        if let Some(engine) = self.active.take() {
            engine.release();
            info!(engine = engine.name(), "Routing engine released");
        }
    }
}

impl Default for RoutingEngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RoutingEngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingEngineRegistry")
            .field("engines", &self.names())
            .field("active", &self.active_name())
            .finish()
    }
}
