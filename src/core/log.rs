//! Transition records and the bounded transition log.
//!
//! Records are immutable once appended. The log follows the same rule: every
//! operation returns a new log and leaves the original untouched, so a log
//! handed out with a state value keeps describing that moment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What kind of operation produced a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// First transition out of the uninitialized sentinel.
    Init,
    ChangeState,
    UpdateState,
    Override,
    Reset,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ChangeState => "change_state",
            Self::UpdateState => "update_state",
            Self::Override => "override",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an attempted transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Success,
    Override,
    Reset,
    /// The attempt changed nothing and was dropped.
    Filtered,
    /// The engine refused the transition.
    Rejected,
    InternalError,
    UnknownError,
    /// A result reported by a newer engine than this crate knows about.
    #[serde(other)]
    Unrecognized,
}

impl ResultKind {
    /// Whether the attempt moved the machine into a new state.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Success | Self::Override)
    }
}

/// Record of one attempted transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: TransitionKind,
    /// The state data involved, serialized when the record was appended.
    /// The uninitialized sentinel is recorded as a plain string.
    pub state_data: serde_json::Value,
    pub result: ResultKind,
    pub message: String,
}

impl TransitionRecord {
    pub fn new(
        kind: TransitionKind,
        state_data: serde_json::Value,
        result: ResultKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            state_data,
            result,
            message: message.into(),
        }
    }
}

/// Bounded, immutable sequence of transition records, oldest first.
///
/// # Example
///
/// ```rust
/// use fsm_binder::core::{ResultKind, TransitionKind, TransitionLog, TransitionRecord};
///
/// let log = TransitionLog::new();
/// let record = TransitionRecord::new(
///     TransitionKind::ChangeState,
///     serde_json::json!({ "state": "go" }),
///     ResultKind::Success,
///     "",
/// );
///
/// let next = log.record(record, 10);
/// assert_eq!(next.len(), 1);
/// assert!(log.is_empty()); // Original unchanged
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionLog {
    records: Arc<Vec<TransitionRecord>>,
}

impl TransitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, returning a new log that keeps at most `capacity`
    /// of the most recent records.
    pub fn record(&self, record: TransitionRecord, capacity: usize) -> Self {
        let mut records = self.records.as_ref().clone();
        records.push(record);
        let overflow = records.len().saturating_sub(capacity);
        records.drain(..overflow);
        Self {
            records: Arc::new(records),
        }
    }

    /// Return a log holding at most the `max_len` most recent records.
    ///
    /// Capping to a length at or above the current length returns the same
    /// log.
    pub fn capped(&self, max_len: usize) -> Self {
        if self.records.len() <= max_len {
            return self.clone();
        }
        let skip = self.records.len() - max_len;
        Self {
            records: Arc::new(self.records[skip..].to_vec()),
        }
    }

    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&TransitionRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
