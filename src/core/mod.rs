//! Core state machine types.
//!
//! This module contains the pure data model shared by every other module:
//! - State tags and per-state data via the `State` and `StateData` traits
//! - The state stream value `CurrentState`
//! - Immutable transition records and the bounded `TransitionLog`
//!
//! Nothing here performs I/O or spawns tasks.

mod log;
mod state;

pub use log::{ResultKind, TransitionKind, TransitionLog, TransitionRecord};
pub use state::{
    assert_unreachable_state, CurrentState, Snapshot, State, StateData, UNINITIALIZED_STATE,
};
