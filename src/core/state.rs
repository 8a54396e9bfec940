//! State tags and state data for bound state machines.
//!
//! A machine is described by two types: a fieldless *tag* enum implementing
//! [`State`], and a data union implementing [`StateData`] whose variants carry
//! the fields that belong to each state.

use super::log::TransitionLog;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// Display name of the sentinel state a machine is in before its first
/// transition.
pub const UNINITIALIZED_STATE: &str = "FSMInit";

/// Trait for state tags.
///
/// All methods are pure. A tag identifies a state without carrying any of
/// its data; the data lives in the matching [`StateData`] variant.
///
/// # Example
///
/// ```rust
/// use fsm_binder::core::State;
///
/// #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
/// enum Light {
///     Go,
///     PrepareToStop,
///     Stop,
/// }
///
/// impl State for Light {
///     fn name(&self) -> &'static str {
///         match self {
///             Self::Go => "go",
///             Self::PrepareToStop => "prepareToStop",
///             Self::Stop => "stop",
///         }
///     }
/// }
///
/// assert_eq!(Light::PrepareToStop.name(), "prepareToStop");
/// ```
pub trait State: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Stable name used in diagrams, debug logs and peer lookups.
    fn name(&self) -> &'static str;

    /// Check if this is a final (terminal) state.
    ///
    /// Final states may have an empty set of allowed next states.
    ///
    /// Default implementation returns `false`.
    fn is_final(&self) -> bool {
        false
    }
}

/// Trait for the discriminated union of per-state data.
///
/// Every value knows which state it belongs to, so the shape of the data is
/// fixed per tag. Serialize with `#[serde(tag = "state")]` so the tag shows up
/// as a `state` field in debug logs and peer views.
pub trait StateData:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The tag type of this machine.
    type State: State;

    /// The tag of the state this data belongs to.
    fn state(&self) -> Self::State;
}

/// The data of a machine, or the sentinel it holds before its first
/// transition.
#[derive(Clone, Debug, PartialEq)]
pub enum Snapshot<D> {
    Uninitialized,
    Active(D),
}

impl<D: StateData> Snapshot<D> {
    pub fn state(&self) -> Option<D::State> {
        match self {
            Self::Uninitialized => None,
            Self::Active(data) => Some(data.state()),
        }
    }

    /// Name of the current state, `FSMInit` for the sentinel.
    pub fn state_name(&self) -> &'static str {
        self.state().map_or(UNINITIALIZED_STATE, |state| state.name())
    }

    pub fn data(&self) -> Option<&D> {
        match self {
            Self::Uninitialized => None,
            Self::Active(data) => Some(data),
        }
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Self::Uninitialized)
    }
}

/// One value of a machine's state stream.
///
/// Carries the transition log exactly as it stood when this value was
/// emitted, so consumers never read records appended by a later transition.
#[derive(Clone, Debug, PartialEq)]
pub struct CurrentState<D: StateData> {
    pub data: Snapshot<D>,
    /// States reachable from here, in declaration order.
    pub can_leave_to: Vec<D::State>,
    pub log: TransitionLog,
}

impl<D: StateData> CurrentState<D> {
    pub fn uninitialized(can_leave_to: Vec<D::State>) -> Self {
        Self {
            data: Snapshot::Uninitialized,
            can_leave_to,
            log: TransitionLog::new(),
        }
    }

    pub fn state(&self) -> Option<D::State> {
        self.data.state()
    }

    pub fn can_leave_to(&self, state: D::State) -> bool {
        self.can_leave_to.contains(&state)
    }

    /// The first allowed next state, the conventional default successor.
    pub fn first_allowed(&self) -> Option<D::State> {
        self.can_leave_to.first().copied()
    }
}

/// Fails loudly when a binding meets a state its match logic does not cover.
///
/// Two statically declared state unions that are meant to be handled
/// exhaustively disagree when this is reached, which is a programming error.
pub fn assert_unreachable_state(name: &str) -> ! {
    unreachable!("state '{name}' is not covered by this binding")
}
