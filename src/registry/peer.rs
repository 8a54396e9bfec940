use crate::core::{Snapshot, State, StateData, UNINITIALIZED_STATE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::watch;

/// A peer's state as seen by machines that do not share its data type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeerState {
    Uninitialized,
    Active { state: String, data: Value },
}

impl PeerState {
    pub fn from_snapshot<D: StateData>(snapshot: &Snapshot<D>) -> Self {
        match snapshot {
            Snapshot::Uninitialized => Self::Uninitialized,
            Snapshot::Active(data) => Self::Active {
                state: data.state().name().to_string(),
                data: serde_json::to_value(data).unwrap_or(Value::Null),
            },
        }
    }

    /// Name of the peer's state, `FSMInit` before its first transition.
    pub fn state_name(&self) -> &str {
        match self {
            Self::Uninitialized => UNINITIALIZED_STATE,
            Self::Active { state, .. } => state,
        }
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Self::Uninitialized)
    }

    pub fn is_in(&self, state: &str) -> bool {
        self.state_name() == state
    }

    /// Decode the peer's data as `D`, when the caller knows its type.
    pub fn data_as<D: StateData>(&self) -> Option<D> {
        match self {
            Self::Uninitialized => None,
            Self::Active { data, .. } => serde_json::from_value(data.clone()).ok(),
        }
    }
}

/// Stream of a peer's state. Closes when the peer is destroyed.
pub type PeerStream = watch::Receiver<PeerState>;

/// How long a lookup waits for a name to appear.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupTimeout {
    /// Wait until the name appears or the caller is destroyed.
    Never,
    /// Give up after the duration. Zero only finds names already present.
    After(Duration),
}

impl LookupTimeout {
    /// Negative values mean no timeout.
    pub fn from_millis(millis: i64) -> Self {
        u64::try_from(millis)
            .map(|ms| Self::After(Duration::from_millis(ms)))
            .unwrap_or(Self::Never)
    }
}

impl Default for LookupTimeout {
    fn default() -> Self {
        Self::After(Duration::ZERO)
    }
}
