//! Merged configuration for a bound state machine.
//!
//! A resolved [`FsmConfig`] is built from defaults plus a caller-supplied
//! [`FsmConfigPatch`]. Snapshots are never mutated: applying a patch returns a
//! new snapshot and the caller diffs old against new with [`FsmConfig::diff`]
//! to decide what to recompute.
//!
//! Validation uses Stillwater's `Validation` so that every violation is
//! reported in one pass.

pub mod error;

pub use error::{ConfigError, ConfigViolation};

use crate::core::StateData;
use serde::{Deserialize, Serialize};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Records retained in the debug log when no capacity is configured.
pub const DEFAULT_DEBUG_LOG_BUFFER_COUNT: usize = 10;

/// Whether debug outputs default to on: true in debug builds.
pub fn default_dev_mode() -> bool {
    cfg!(debug_assertions)
}

/// Layout direction of a generated state diagram.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagramDirection {
    #[default]
    #[serde(rename = "TB")]
    TopToBottom,
    #[serde(rename = "BT")]
    BottomToTop,
    #[serde(rename = "LR")]
    LeftToRight,
    #[serde(rename = "RL")]
    RightToLeft,
}

impl DiagramDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopToBottom => "TB",
            Self::BottomToTop => "BT",
            Self::LeftToRight => "LR",
            Self::RightToLeft => "RL",
        }
    }
}

/// A fully resolved configuration snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct FsmConfig<D> {
    /// Registry name; empty means the instance is not shared.
    pub name: String,
    pub output_state_diagram: bool,
    pub output_debug_log: bool,
    pub debug_log_buffer_count: usize,
    pub state_diagram_direction: DiagramDirection,
    /// State forced onto the machine, bypassing transition validation.
    pub state_override: Option<D>,
    pub reset_debug_log_on_override: bool,
}

impl<D: StateData> FsmConfig<D> {
    /// Defaults for the given mode. Debug outputs are on in dev mode only.
    pub fn defaults(dev_mode: bool) -> Self {
        Self {
            name: String::new(),
            output_state_diagram: dev_mode,
            output_debug_log: dev_mode,
            debug_log_buffer_count: DEFAULT_DEBUG_LOG_BUFFER_COUNT,
            state_diagram_direction: DiagramDirection::default(),
            state_override: None,
            reset_debug_log_on_override: true,
        }
    }

    /// Merge `patch` over the defaults and validate the result.
    pub fn resolve(patch: &FsmConfigPatch<D>, dev_mode: bool) -> Result<Self, ConfigError> {
        Self::defaults(dev_mode).apply(patch).validated()
    }

    /// Return a new snapshot with every field present in `patch` replaced.
    pub fn apply(&self, patch: &FsmConfigPatch<D>) -> Self {
        Self {
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            output_state_diagram: patch
                .output_state_diagram
                .unwrap_or(self.output_state_diagram),
            output_debug_log: patch.output_debug_log.unwrap_or(self.output_debug_log),
            debug_log_buffer_count: patch
                .debug_log_buffer_count
                .unwrap_or(self.debug_log_buffer_count),
            state_diagram_direction: patch
                .state_diagram_direction
                .unwrap_or(self.state_diagram_direction),
            state_override: patch
                .state_override
                .clone()
                .or_else(|| self.state_override.clone()),
            reset_debug_log_on_override: patch
                .reset_debug_log_on_override
                .unwrap_or(self.reset_debug_log_on_override),
        }
    }

    /// Check every rule, accumulating all violations.
    pub fn validate(&self) -> Validation<(), NonEmptyVec<ConfigViolation>> {
        let buffer: Validation<(), NonEmptyVec<ConfigViolation>> =
            if self.debug_log_buffer_count == 0 {
                Validation::fail(ConfigViolation::EmptyDebugLogBuffer(
                    self.debug_log_buffer_count,
                ))
            } else {
                Validation::success(())
            };

        let name: Validation<(), NonEmptyVec<ConfigViolation>> =
            if self.name.chars().any(char::is_whitespace) {
                Validation::fail(ConfigViolation::NameContainsWhitespace(self.name.clone()))
            } else {
                Validation::success(())
            };

        Validation::all_vec(vec![buffer, name]).map(|_| ())
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        match self.validate() {
            Validation::Success(_) => Ok(self),
            Validation::Failure(violations) => Err(ConfigError::Invalid(
                violations.iter().cloned().collect(),
            )),
        }
    }

    /// Compare two snapshots field by field.
    pub fn diff(&self, next: &Self) -> ConfigDiff {
        ConfigDiff {
            name: self.name != next.name,
            output_state_diagram: self.output_state_diagram != next.output_state_diagram,
            output_debug_log: self.output_debug_log != next.output_debug_log,
            debug_log_buffer_count: self.debug_log_buffer_count != next.debug_log_buffer_count,
            state_diagram_direction: self.state_diagram_direction
                != next.state_diagram_direction,
            state_override: self.state_override != next.state_override,
            reset_debug_log_on_override: self.reset_debug_log_on_override
                != next.reset_debug_log_on_override,
        }
    }
}

/// Which fields differ between two snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    pub name: bool,
    pub output_state_diagram: bool,
    pub output_debug_log: bool,
    pub debug_log_buffer_count: bool,
    pub state_diagram_direction: bool,
    pub state_override: bool,
    pub reset_debug_log_on_override: bool,
}

impl ConfigDiff {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A partial configuration. Absent fields keep their current value.
///
/// Deserializes from camelCase JSON, so host-side configuration objects can
/// be passed through unchanged:
///
/// ```rust
/// use fsm_binder::config::FsmConfigPatch;
/// # use fsm_binder::core::{State, StateData};
/// # use serde::{Deserialize, Serialize};
/// # fsm_binder::state_enum! { enum Tag { On } }
/// # #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
/// # #[serde(tag = "state")]
/// # enum Data { On }
/// # impl StateData for Data {
/// #     type State = Tag;
/// #     fn state(&self) -> Tag { Tag::On }
/// # }
///
/// let patch: FsmConfigPatch<Data> =
///     serde_json::from_str(r#"{ "name": "lamp", "debugLogBufferCount": 25 }"#).unwrap();
/// assert_eq!(patch.name.as_deref(), Some("lamp"));
/// assert_eq!(patch.debug_log_buffer_count, Some(25));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", bound = "D: StateData")]
pub struct FsmConfigPatch<D> {
    pub name: Option<String>,
    #[serde(rename = "outputStateDiagramDefinition")]
    pub output_state_diagram: Option<bool>,
    pub output_debug_log: Option<bool>,
    pub debug_log_buffer_count: Option<usize>,
    pub state_diagram_direction: Option<DiagramDirection>,
    pub state_override: Option<D>,
    pub reset_debug_log_on_override: Option<bool>,
}

impl<D> Default for FsmConfigPatch<D> {
    fn default() -> Self {
        Self {
            name: None,
            output_state_diagram: None,
            output_debug_log: None,
            debug_log_buffer_count: None,
            state_diagram_direction: None,
            state_override: None,
            reset_debug_log_on_override: None,
        }
    }
}

impl<D: StateData> FsmConfigPatch<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn output_state_diagram(mut self, enabled: bool) -> Self {
        self.output_state_diagram = Some(enabled);
        self
    }

    pub fn output_debug_log(mut self, enabled: bool) -> Self {
        self.output_debug_log = Some(enabled);
        self
    }

    pub fn debug_log_buffer_count(mut self, count: usize) -> Self {
        self.debug_log_buffer_count = Some(count);
        self
    }

    pub fn state_diagram_direction(mut self, direction: DiagramDirection) -> Self {
        self.state_diagram_direction = Some(direction);
        self
    }

    pub fn state_override(mut self, data: D) -> Self {
        self.state_override = Some(data);
        self
    }

    pub fn reset_debug_log_on_override(mut self, enabled: bool) -> Self {
        self.reset_debug_log_on_override = Some(enabled);
        self
    }

    /// Layer `other` over `self`; fields present in `other` win.
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            name: other.name.clone().or_else(|| self.name.clone()),
            output_state_diagram: other.output_state_diagram.or(self.output_state_diagram),
            output_debug_log: other.output_debug_log.or(self.output_debug_log),
            debug_log_buffer_count: other.debug_log_buffer_count.or(self.debug_log_buffer_count),
            state_diagram_direction: other
                .state_diagram_direction
                .or(self.state_diagram_direction),
            state_override: other
                .state_override
                .clone()
                .or_else(|| self.state_override.clone()),
            reset_debug_log_on_override: other
                .reset_debug_log_on_override
                .or(self.reset_debug_log_on_override),
        }
    }
}
