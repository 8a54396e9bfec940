//! One engine instance wrapped for a host component.
//!
//! An [`Adapter`] owns the engine, the merged configuration and the
//! lifecycle signals other tasks hang off: *destroyed*, *transition
//! completed* and *override applied*. Clones share the same instance.
//!
//! Configuration changes never trigger a transition by themselves. The only
//! path from configuration to state is [`Adapter::apply_override_if_changed`],
//! which forces the engine into the configured override when it differs from
//! the previous one.

mod signals;

use crate::config::{ConfigError, FsmConfig, FsmConfigPatch};
use crate::core::{
    CurrentState, ResultKind, State, StateData, TransitionLog, UNINITIALIZED_STATE,
};
use crate::diagram::DiagramCache;
use crate::engine::{FsmEngine, StateMap, StateMapEngine, StateStream};
use crate::registry::{LookupTimeout, PeerState, PeerStream, Registry};
use parking_lot::Mutex;
use signals::Signals;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Handle to a bound machine instance.
pub struct Adapter<D: StateData> {
    inner: Arc<AdapterInner<D>>,
}

struct AdapterInner<D: StateData> {
    id: Uuid,
    engine: Arc<dyn FsmEngine<D>>,
    dev_mode: bool,
    config: Mutex<Arc<FsmConfig<D>>>,
    signals: Signals,
    diagrams: Mutex<DiagramCache>,
    peer: Mutex<Option<PeerStream>>,
}

impl<D: StateData> Clone for Adapter<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: StateData> std::fmt::Debug for Adapter<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("id", &self.inner.id)
            .field("name", &self.config().name)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl<D: StateData> Adapter<D> {
    /// Build an adapter around the reference engine.
    ///
    /// `patch` is merged over the defaults for `dev_mode` and validated. A
    /// state override present in the result is applied immediately.
    pub fn new(
        state_map: StateMap<D::State>,
        patch: &FsmConfigPatch<D>,
        dev_mode: bool,
    ) -> Result<Self, ConfigError> {
        let config = FsmConfig::resolve(patch, dev_mode)?;
        let engine = StateMapEngine::new(state_map, config.debug_log_buffer_count);
        Ok(Self::from_parts(Arc::new(engine), config, dev_mode))
    }

    /// Build an adapter around any engine.
    pub fn with_engine(
        engine: Arc<dyn FsmEngine<D>>,
        patch: &FsmConfigPatch<D>,
        dev_mode: bool,
    ) -> Result<Self, ConfigError> {
        let config = FsmConfig::resolve(patch, dev_mode)?;
        engine.cap_debug_log(config.debug_log_buffer_count);
        Ok(Self::from_parts(engine, config, dev_mode))
    }

    fn from_parts(engine: Arc<dyn FsmEngine<D>>, config: FsmConfig<D>, dev_mode: bool) -> Self {
        let initial_override = config.state_override.clone();
        let adapter = Self {
            inner: Arc::new(AdapterInner {
                id: Uuid::new_v4(),
                engine,
                dev_mode,
                config: Mutex::new(Arc::new(config)),
                signals: Signals::new(),
                diagrams: Mutex::new(DiagramCache::new()),
                peer: Mutex::new(None),
            }),
        };
        debug!(instance = %adapter.inner.id, name = %adapter.config().name, "Adapter created");
        adapter.apply_override_if_changed(None, initial_override.as_ref());
        adapter
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn dev_mode(&self) -> bool {
        self.inner.dev_mode
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> Arc<FsmConfig<D>> {
        Arc::clone(&self.inner.config.lock())
    }

    /// Replace the configuration with `previous` plus `patch`.
    ///
    /// Returns `(previous, next)` so the caller can diff them. An invalid
    /// result is rejected and the previous snapshot stays in place.
    pub fn update_config(
        &self,
        patch: &FsmConfigPatch<D>,
    ) -> Result<(Arc<FsmConfig<D>>, Arc<FsmConfig<D>>), ConfigError> {
        let mut slot = self.inner.config.lock();
        let previous = Arc::clone(&slot);
        let next = Arc::new(previous.apply(patch).validated()?);
        *slot = Arc::clone(&next);
        Ok((previous, next))
    }

    /// Force the engine into `next` when it differs from `previous`.
    ///
    /// Returns whether an override was applied. Fires *override applied*
    /// before touching the engine so pending timed transitions are dropped.
    pub fn apply_override_if_changed(&self, previous: Option<&D>, next: Option<&D>) -> bool {
        let Some(next) = next else {
            return false;
        };
        if previous == Some(next) {
            return false;
        }

        self.inner.signals.notify_override_applied();
        let reset = self.config().reset_debug_log_on_override;
        let result = self.inner.engine.override_state(next.clone(), reset);
        self.clear_diagram_text();
        if result.is_committed() {
            self.inner.signals.notify_transition_completed();
        }
        debug!(
            instance = %self.inner.id,
            state = next.state().name(),
            reset,
            "State override applied"
        );
        true
    }

    pub fn cap_log_length(&self, max_len: usize) {
        self.inner.engine.cap_debug_log(max_len);
    }

    pub fn clear_diagram_text(&self) {
        self.inner.diagrams.lock().clear();
    }

    /// Diagram text for `highlight`, served from the cache when possible.
    pub fn diagram_text(&self, highlight: Option<D::State>) -> String {
        let key = highlight.map_or(UNINITIALIZED_STATE, |state| state.name());
        if let Some(text) = self.inner.diagrams.lock().get(key) {
            return text;
        }
        // The engine may call back into this adapter.
        let text = self.state_diagram_definition(highlight);
        self.inner.diagrams.lock().insert(key, text)
    }

    /// Freshly generated diagram text, bypassing the cache.
    pub fn state_diagram_definition(&self, highlight: Option<D::State>) -> String {
        let direction = self.config().state_diagram_direction;
        self.inner
            .engine
            .state_diagram_definition(direction, highlight)
    }

    pub fn current_state(&self) -> CurrentState<D> {
        self.inner.engine.current_state()
    }

    pub fn state_stream(&self) -> StateStream<D> {
        self.inner.engine.state_stream()
    }

    pub fn debug_log(&self) -> TransitionLog {
        self.inner.engine.debug_log()
    }

    pub fn change_state(&self, next: D) -> ResultKind {
        let result = self.inner.engine.change_state(next);
        if result.is_committed() {
            self.inner.signals.notify_transition_completed();
        }
        result
    }

    /// Replace the current state's data. Does not count as a completed
    /// transition.
    pub fn update_state(&self, data: D) -> ResultKind {
        self.inner.engine.update_state(data)
    }

    /// Fire *destroyed* and complete the state stream. Idempotent.
    pub fn destroy(&self) {
        if self.inner.signals.destroyed.is_cancelled() {
            return;
        }
        self.inner.engine.destroy();
        self.inner.signals.destroyed.cancel();
        debug!(instance = %self.inner.id, "Adapter destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.signals.destroyed.is_cancelled()
    }

    /// Token that fires once when this adapter is destroyed.
    pub fn destroyed(&self) -> CancellationToken {
        self.inner.signals.destroyed.clone()
    }

    pub fn on_transition_completed(&self) -> broadcast::Receiver<()> {
        self.inner.signals.transition_completed.subscribe()
    }

    pub fn on_override_applied(&self) -> broadcast::Receiver<()> {
        self.inner.signals.override_applied.subscribe()
    }

    /// Type-erased view of this machine's state for peers.
    ///
    /// The first call starts a forwarding task, so it must run within a
    /// tokio runtime. The stream closes when the adapter is destroyed.
    pub fn peer_stream(&self) -> PeerStream {
        if let Some(stream) = self.inner.peer.lock().as_ref() {
            return stream.clone();
        }

        let mut states = self.state_stream();
        let initial = PeerState::from_snapshot(&states.borrow_and_update().data);
        let (sender, stream) = watch::channel(initial);

        let mut slot = self.inner.peer.lock();
        if let Some(existing) = slot.as_ref() {
            return existing.clone();
        }
        tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let next = PeerState::from_snapshot(&states.borrow_and_update().data);
                sender.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    *current = next;
                    true
                });
            }
        });

        *slot = Some(stream.clone());
        stream
    }

    /// Publish this machine in `registry` under its configured name.
    ///
    /// Returns `false` for an unnamed machine or a name already taken.
    pub fn register(&self, registry: &Registry) -> bool {
        let name = self.config().name.clone();
        if name.is_empty() {
            return false;
        }
        registry.register(&name, self.peer_stream(), &self.inner.signals.destroyed)
    }

    /// After `delay`, change to the state `next` computes from the current
    /// one.
    ///
    /// Dropped if any transition completes, an override is applied or the
    /// adapter is destroyed first. Returning `None` from `next` skips the
    /// transition.
    pub fn schedule_transition<F>(&self, delay: Duration, next: F) -> JoinHandle<()>
    where
        F: FnOnce(&CurrentState<D>) -> Option<D> + Send + 'static,
    {
        let adapter = self.clone();
        let destroyed = self.destroyed();
        let mut completed = self.on_transition_completed();
        let mut overridden = self.on_override_applied();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = destroyed.cancelled() => return,
                _ = completed.recv() => return,
                _ = overridden.recv() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let current = adapter.current_state();
            if let Some(data) = next(&current) {
                adapter.change_state(data);
            }
        })
    }

    /// Follow the machine registered as `name` in `registry`.
    ///
    /// `decide` runs once per state the peer emits, with this machine's
    /// current state, and once with `None` if the lookup times out. A
    /// returned state is applied only when it is an allowed next state.
    /// The binding ends when either side is destroyed.
    pub fn bind_to_peer<F>(
        &self,
        registry: &Registry,
        name: impl Into<String>,
        timeout: LookupTimeout,
        mut decide: F,
    ) -> JoinHandle<()>
    where
        F: FnMut(Option<&PeerState>, &CurrentState<D>) -> Option<D> + Send + 'static,
    {
        let adapter = self.clone();
        let registry = registry.clone();
        let name = name.into();
        let destroyed = self.destroyed();
        tokio::spawn(async move {
            let Some(mut peer) = registry.lookup(&name, &destroyed, timeout).await else {
                if !destroyed.is_cancelled() {
                    let next = decide(None, &adapter.current_state());
                    adapter.change_state_if_allowed(next);
                }
                return;
            };
            debug!(instance = %adapter.id(), peer = %name, "Bound to peer");

            loop {
                let view = peer.borrow_and_update().clone();
                let next = decide(Some(&view), &adapter.current_state());
                adapter.change_state_if_allowed(next);

                tokio::select! {
                    biased;
                    _ = destroyed.cancelled() => break,
                    changed = peer.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }

    fn change_state_if_allowed(&self, next: Option<D>) {
        let Some(next) = next else {
            return;
        };
        let current = self.current_state();
        if current.can_leave_to(next.state()) {
            self.change_state(next);
        } else {
            debug!(
                instance = %self.inner.id,
                from = current.data.state_name(),
                to = next.state().name(),
                "Peer-driven transition not allowed, ignored"
            );
        }
    }
}
