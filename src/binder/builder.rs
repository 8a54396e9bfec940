//! Builder for constructing binders.

use super::{Binder, DebugSet, EngineFactory};
use crate::config::{default_dev_mode, ConfigError, FsmConfig, FsmConfigPatch};
use crate::core::StateData;
use crate::engine::{FsmEngine, StateMap};
use crate::registry::Registry;
use std::sync::Arc;

/// Builder for a [`Binder`] with a fluent API.
pub struct BinderBuilder<D: StateData> {
    state_map: StateMap<D::State>,
    defaults: FsmConfigPatch<D>,
    dev_mode: bool,
    debug_set: Option<DebugSet>,
    registry: Option<Registry>,
    engine: Option<EngineFactory<D>>,
}

impl<D: StateData> BinderBuilder<D> {
    pub(super) fn new(state_map: StateMap<D::State>) -> Self {
        Self {
            state_map,
            defaults: FsmConfigPatch::default(),
            dev_mode: default_dev_mode(),
            debug_set: None,
            registry: None,
            engine: None,
        }
    }

    /// Component-level configuration. Props passed to
    /// [`Binder::set_props`] are layered over it.
    pub fn defaults(mut self, patch: FsmConfigPatch<D>) -> Self {
        self.defaults = patch;
        self
    }

    /// Reload-tolerant mode: turns debug outputs on by default and defers
    /// destruction on unmount.
    pub fn dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    /// Publish the debug log and diagram text into `debug_set`.
    pub fn debug_set(mut self, debug_set: DebugSet) -> Self {
        self.debug_set = Some(debug_set);
        self
    }

    /// Register named instances in `registry` when they are created.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build each adapter around an engine from `factory` instead of the
    /// state-map engine. The state map then only serves as documentation.
    pub fn engine<E, F>(mut self, factory: F) -> Self
    where
        E: FsmEngine<D> + 'static,
        F: Fn() -> E + Send + Sync + 'static,
    {
        self.engine = Some(Arc::new(move || Arc::new(factory()) as Arc<dyn FsmEngine<D>>));
        self
    }

    /// Build the binder.
    /// Returns an error if the defaults do not form a valid configuration.
    pub fn build(self) -> Result<Binder<D>, ConfigError> {
        FsmConfig::resolve(&self.defaults, self.dev_mode)?;
        Ok(Binder::from_builder(
            self.state_map,
            self.defaults,
            self.dev_mode,
            self.debug_set,
            self.registry,
            self.engine,
        ))
    }
}
