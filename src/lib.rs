//! fsm-binder: lifecycle binding and cross-instance state sharing for
//! finite state machines.
//!
//! The crate sits between a state machine engine and the component that
//! hosts it. The engine owns transition semantics; this crate owns
//! everything around it:
//!
//! - **Adapter**: wraps one engine instance with merged configuration and
//!   lifecycle signals
//! - **Binder**: creates and tears down the adapter in step with a host's
//!   mount and unmount, surviving hot-reload double mounts
//! - **Registry**: lets machines observe each other's state by name
//! - **Debug outputs**: display-ready transition log rows and Mermaid
//!   state diagram text
//!
//! # Example
//!
//! ```rust
//! use fsm_binder::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! state_enum! {
//!     enum Door {
//!         Open = "open",
//!         Closed = "closed",
//!     }
//! }
//!
//! #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
//! #[serde(tag = "state", rename_all = "camelCase")]
//! enum DoorData {
//!     Open,
//!     Closed { locked: bool },
//! }
//!
//! impl StateData for DoorData {
//!     type State = Door;
//!
//!     fn state(&self) -> Door {
//!         match self {
//!             Self::Open => Door::Open,
//!             Self::Closed { .. } => Door::Closed,
//!         }
//!     }
//! }
//!
//! let map = StateMap::new()
//!     .initial([Door::Closed])
//!     .state(Door::Closed, [Door::Open])
//!     .state(Door::Open, [Door::Closed]);
//!
//! let door = Adapter::new(map, &FsmConfigPatch::new(), false).unwrap();
//! assert_eq!(door.change_state(DoorData::Open), ResultKind::Rejected);
//! assert_eq!(door.change_state(DoorData::Closed { locked: false }), ResultKind::Success);
//! assert_eq!(door.debug_log().len(), 2);
//! ```

#[macro_use]
mod macros;

pub mod adapter;
pub mod binder;
pub mod config;
pub mod core;
pub mod debug_log;
pub mod diagram;
pub mod engine;
pub mod registry;

// Re-export commonly used types
pub use adapter::Adapter;
pub use binder::{Binder, DebugSet, LifecyclePhase};
pub use config::{ConfigError, FsmConfig, FsmConfigPatch};
pub use crate::core::{CurrentState, ResultKind, Snapshot, State, StateData};
pub use registry::{LookupTimeout, PeerState, Registry};

pub mod prelude {
    pub use crate::adapter::Adapter;
    pub use crate::binder::{Binder, DebugSet, LifecyclePhase};
    pub use crate::config::{ConfigError, DiagramDirection, FsmConfigPatch};
    pub use crate::core::{CurrentState, ResultKind, Snapshot, State, StateData};
    pub use crate::engine::StateMap;
    pub use crate::registry::{LookupTimeout, PeerState, Registry};
    pub use crate::state_enum;
}
