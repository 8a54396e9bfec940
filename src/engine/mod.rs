//! The state machine engine seen through a narrow capability interface.
//!
//! Adapters never depend on a concrete engine: they hold an
//! `Arc<dyn FsmEngine<D>>` and forward to it. [`StateMapEngine`] is the
//! engine used when none is supplied; it validates transitions against a
//! [`StateMap`] and records every attempt.

mod basic;
mod state_map;

pub use basic::StateMapEngine;
pub use state_map::StateMap;

use crate::config::DiagramDirection;
use crate::core::{CurrentState, ResultKind, StateData, TransitionLog};
use tokio::sync::watch;

/// Push-based stream of a machine's current state. Completes when the
/// engine is destroyed.
pub type StateStream<D> = watch::Receiver<CurrentState<D>>;

/// Operations the binding layer needs from an engine.
///
/// Failed transitions are reported through the returned [`ResultKind`] and
/// the transition log, never through panics or errors.
pub trait FsmEngine<D: StateData>: Send + Sync {
    /// Subscribe to the state stream. The receiver starts at the current
    /// value; after `destroy` it is already closed.
    fn state_stream(&self) -> StateStream<D>;

    fn current_state(&self) -> CurrentState<D>;

    /// Move to a new state, validated against the allowed transitions.
    fn change_state(&self, next: D) -> ResultKind;

    /// Replace the data of the current state without leaving it.
    fn update_state(&self, data: D) -> ResultKind;

    /// Force the machine into `data`, bypassing validation.
    fn override_state(&self, data: D, reset_debug_log: bool) -> ResultKind;

    fn state_diagram_definition(
        &self,
        direction: DiagramDirection,
        highlight: Option<D::State>,
    ) -> String;

    fn debug_log(&self) -> TransitionLog;

    /// Keep at most `max_len` records from now on, evicting oldest first.
    fn cap_debug_log(&self, max_len: usize);

    /// Complete the state stream. Later operations are ignored.
    fn destroy(&self);

    fn is_destroyed(&self) -> bool;
}
