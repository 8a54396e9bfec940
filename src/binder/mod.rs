//! Ties one adapter to the mount-to-unmount lifecycle of a host component.
//!
//! A host calls [`Binder::mount`] when its component appears,
//! [`Binder::set_props`] whenever its configuration changes and
//! [`Binder::unmount`] when it goes away. The binder guarantees at most one
//! live adapter and one live state subscription at any time.
//!
//! In dev mode a host may unmount and remount within one scheduling tick
//! (hot reload). Destruction is then deferred by one tick and cancelled by
//! the remount, so the instance survives with its state intact.

mod builder;
mod debug_set;
mod phase;

pub use builder::BinderBuilder;
pub use debug_set::DebugSet;
pub use phase::LifecyclePhase;

use crate::adapter::Adapter;
use crate::config::{ConfigError, FsmConfig, FsmConfigPatch};
use crate::core::{CurrentState, Snapshot, StateData};
use crate::debug_log::process_debug_log;
use crate::engine::{FsmEngine, StateMap, StateStream};
use crate::registry::Registry;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Produces the engine for each newly created adapter.
pub(crate) type EngineFactory<D> = Arc<dyn Fn() -> Arc<dyn FsmEngine<D>> + Send + Sync>;

/// Lifecycle binding of one machine to one host component.
///
/// # Example
///
/// ```rust
/// use fsm_binder::binder::{Binder, LifecyclePhase};
/// use fsm_binder::core::StateData;
/// use fsm_binder::engine::StateMap;
/// use fsm_binder::state_enum;
/// use serde::{Deserialize, Serialize};
///
/// state_enum! { enum Lamp { On = "on", Off = "off" } }
///
/// #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
/// #[serde(tag = "state", rename_all = "camelCase")]
/// enum LampData { On, Off }
///
/// impl StateData for LampData {
///     type State = Lamp;
///     fn state(&self) -> Lamp {
///         match self { Self::On => Lamp::On, Self::Off => Lamp::Off }
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let binder = Binder::builder(
///     StateMap::new().initial([Lamp::Off]).state(Lamp::Off, [Lamp::On]).state(Lamp::On, [Lamp::Off]),
/// )
/// .dev_mode(false)
/// .build()
/// .unwrap();
///
/// let lamp = binder.mount().unwrap();
/// lamp.change_state(LampData::Off);
/// assert_eq!(binder.phase(), LifecyclePhase::Active);
///
/// binder.unmount();
/// assert_eq!(binder.phase(), LifecyclePhase::Destroyed);
/// assert!(lamp.is_destroyed());
/// # }
/// ```
pub struct Binder<D: StateData> {
    shared: Arc<BinderShared<D>>,
}

struct BinderShared<D: StateData> {
    state_map: StateMap<D::State>,
    dev_mode: bool,
    debug_set: Option<DebugSet>,
    registry: Option<Registry>,
    engine: Option<EngineFactory<D>>,
    slot: Mutex<Slot<D>>,
    published: watch::Sender<Snapshot<D>>,
}

struct Slot<D: StateData> {
    phase: LifecyclePhase,
    adapter: Option<Adapter<D>>,
    subscription: Option<JoinHandle<()>>,
    pending_destroy: Option<CancellationToken>,
    /// Defaults with every prop patch layered on, used to recreate the
    /// adapter after a destroy.
    props: FsmConfigPatch<D>,
}

impl<D: StateData> Slot<D> {
    /// Stop the subscription and give up the adapter. The caller destroys
    /// the returned adapter after dropping the slot lock.
    fn release(&mut self) -> Option<Adapter<D>> {
        if let Some(subscription) = self.subscription.take() {
            subscription.abort();
        }
        if let Some(pending) = self.pending_destroy.take() {
            pending.cancel();
        }
        self.phase = LifecyclePhase::Destroyed;
        self.adapter.take()
    }

    fn holds(&self, adapter: &Adapter<D>) -> bool {
        self.adapter
            .as_ref()
            .is_some_and(|current| current.id() == adapter.id())
    }
}

impl<D: StateData> Binder<D> {
    pub fn builder(state_map: StateMap<D::State>) -> BinderBuilder<D> {
        BinderBuilder::new(state_map)
    }

    fn from_builder(
        state_map: StateMap<D::State>,
        defaults: FsmConfigPatch<D>,
        dev_mode: bool,
        debug_set: Option<DebugSet>,
        registry: Option<Registry>,
        engine: Option<EngineFactory<D>>,
    ) -> Self {
        let (published, _) = watch::channel(Snapshot::Uninitialized);
        Self {
            shared: Arc::new(BinderShared {
                state_map,
                dev_mode,
                debug_set,
                registry,
                engine,
                slot: Mutex::new(Slot {
                    phase: LifecyclePhase::Uncreated,
                    adapter: None,
                    subscription: None,
                    pending_destroy: None,
                    props: defaults,
                }),
                published,
            }),
        }
    }

    /// Bring the component up.
    ///
    /// Cancels a pending deferred destroy, creates the adapter if there is
    /// none (registering it when named and a registry is attached) and
    /// subscribes to its state stream once. Must run within a tokio runtime.
    pub fn mount(&self) -> Result<Adapter<D>, ConfigError> {
        let props = {
            let mut slot = self.shared.slot.lock();
            if let Some(pending) = slot.pending_destroy.take() {
                pending.cancel();
                debug!("Deferred destroy cancelled by remount");
            }

            match slot.adapter.clone() {
                Some(adapter) if !adapter.is_destroyed() => {
                    slot.phase = LifecyclePhase::Active;
                    return Ok(adapter);
                }
                Some(_) => {
                    slot.release();
                }
                None => {}
            }
            slot.props.clone()
        };

        // The engine may be caller code, so it is built and subscribed to
        // without the slot lock held.
        let adapter = self.shared.create_adapter(&props)?;
        let states = adapter.state_stream();

        let mut slot = self.shared.slot.lock();
        if let Some(existing) = slot.adapter.clone() {
            drop(slot);
            debug!(instance = %adapter.id(), "Concurrent mount won, discarding adapter");
            adapter.destroy();
            return Ok(existing);
        }
        slot.subscription = Some(self.subscribe(&adapter, states));
        slot.adapter = Some(adapter.clone());
        slot.phase = LifecyclePhase::Active;
        Ok(adapter)
    }

    fn subscribe(&self, adapter: &Adapter<D>, mut states: StateStream<D>) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let adapter = adapter.clone();
        let destroyed = adapter.destroyed();
        debug!(instance = %adapter.id(), "Subscribed to state stream");

        tokio::spawn(async move {
            loop {
                let current = states.borrow_and_update().clone();
                if !current.data.is_uninitialized() {
                    shared.publish(&adapter, &current);
                }

                tokio::select! {
                    biased;
                    _ = destroyed.cancelled() => break,
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            // Destroyed from outside the binder.
            shared.destroy_if_current(&adapter);
        })
    }

    /// Layer `patch` over the current props and recompute what changed.
    ///
    /// Before the first mount, or after a destroy, the patch is only
    /// remembered for the next adapter.
    pub fn set_props(&self, patch: &FsmConfigPatch<D>) -> Result<(), ConfigError> {
        let (adapter, previous, next) = {
            let mut slot = self.shared.slot.lock();
            let merged = slot.props.merge(patch);

            let Some(adapter) = slot.adapter.clone() else {
                FsmConfig::resolve(&merged, self.shared.dev_mode)?;
                slot.props = merged;
                return Ok(());
            };

            let (previous, next) = adapter.update_config(patch)?;
            slot.props = merged;
            (adapter, previous, next)
        };

        adapter.apply_override_if_changed(
            previous.state_override.as_ref(),
            next.state_override.as_ref(),
        );

        let diff = previous.diff(&next);
        let mut force_log = false;
        if diff.debug_log_buffer_count {
            adapter.cap_log_length(next.debug_log_buffer_count);
            force_log = next.output_debug_log;
        }

        let mut force_diagram = false;
        if diff.state_diagram_direction {
            // Cached text bakes in the old direction.
            adapter.clear_diagram_text();
            force_diagram = next.output_state_diagram;
        }

        let Some(debug_set) = &self.shared.debug_set else {
            return Ok(());
        };

        if force_log || diff.output_debug_log {
            let rows = next
                .output_debug_log
                .then(|| process_debug_log(adapter.debug_log().records(), debug_set.keys()));
            debug_set.publish_log(rows);
        }

        if force_diagram || diff.output_state_diagram {
            if next.output_state_diagram {
                let highlight = adapter.current_state().state();
                debug_set.publish_diagram(Some(adapter.diagram_text(highlight)));
            } else {
                adapter.clear_diagram_text();
                debug_set.publish_diagram(None);
            }
        }

        Ok(())
    }

    /// Take the component down.
    ///
    /// In dev mode destruction waits one scheduling tick and is cancelled by
    /// a remount; otherwise the adapter is destroyed now.
    pub fn unmount(&self) {
        let mut slot = self.shared.slot.lock();
        let Some(adapter) = slot.adapter.clone() else {
            return;
        };

        if !self.shared.dev_mode {
            let released = slot.release();
            drop(slot);
            if let Some(adapter) = released {
                adapter.destroy();
            }
            return;
        }

        slot.phase = LifecyclePhase::TearingDown;
        let pending = CancellationToken::new();
        if let Some(previous) = slot.pending_destroy.replace(pending.clone()) {
            previous.cancel();
        }

        let shared = Arc::clone(&self.shared);
        let destroyed = adapter.destroyed();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = pending.cancelled() => {}
                _ = destroyed.cancelled() => shared.destroy_deferred(&adapter, &pending),
                _ = tokio::task::yield_now() => shared.destroy_deferred(&adapter, &pending),
            }
        });
    }

    /// Destroy immediately, whatever the mode.
    pub fn destroy(&self) {
        self.shared.destroy();
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.shared.slot.lock().phase
    }

    /// The live adapter, if any.
    pub fn adapter(&self) -> Option<Adapter<D>> {
        self.shared.slot.lock().adapter.clone()
    }

    /// Snapshots published by the subscription, starting uninitialized.
    pub fn state(&self) -> watch::Receiver<Snapshot<D>> {
        self.shared.published.subscribe()
    }

    pub fn debug_set(&self) -> Option<&DebugSet> {
        self.shared.debug_set.as_ref()
    }

    pub fn dev_mode(&self) -> bool {
        self.shared.dev_mode
    }
}

impl<D: StateData> BinderShared<D> {
    fn create_adapter(&self, props: &FsmConfigPatch<D>) -> Result<Adapter<D>, ConfigError> {
        let adapter = match &self.engine {
            Some(factory) => Adapter::with_engine(factory(), props, self.dev_mode)?,
            None => Adapter::new(self.state_map.clone(), props, self.dev_mode)?,
        };
        if let Some(registry) = &self.registry {
            adapter.register(registry);
        }
        Ok(adapter)
    }

    fn publish(&self, adapter: &Adapter<D>, current: &CurrentState<D>) {
        if let Some(debug_set) = &self.debug_set {
            let config = adapter.config();
            if config.output_state_diagram {
                debug_set.publish_diagram(Some(adapter.diagram_text(current.state())));
            }
            if config.output_debug_log {
                debug_set.publish_log(Some(process_debug_log(
                    current.log.records(),
                    debug_set.keys(),
                )));
            }
        }
        self.published.send_replace(current.data.clone());
    }

    fn destroy(&self) {
        let released = self.slot.lock().release();
        if let Some(adapter) = released {
            adapter.destroy();
        }
    }

    fn destroy_deferred(&self, adapter: &Adapter<D>, pending: &CancellationToken) {
        let released = {
            let mut slot = self.slot.lock();
            // A remount cancels under this lock, so the check cannot race it.
            if pending.is_cancelled() || !slot.holds(adapter) {
                return;
            }
            slot.release()
        };
        if let Some(adapter) = released {
            debug!(instance = %adapter.id(), "Deferred destroy");
            adapter.destroy();
        }
    }

    /// Release `adapter` if it is still the live one.
    fn destroy_if_current(&self, adapter: &Adapter<D>) {
        let released = {
            let mut slot = self.slot.lock();
            if !slot.holds(adapter) {
                return;
            }
            slot.release()
        };
        if let Some(adapter) = released {
            debug!(instance = %adapter.id(), "Adapter released after destroy");
            adapter.destroy();
        }
    }
}

impl<D: StateData> Drop for Binder<D> {
    fn drop(&mut self) {
        self.shared.destroy();
    }
}
