//! Turns transition records into display-ready rows.
//!
//! The transform is pure: the same records and keys always produce the same
//! rows, newest first.

use crate::core::{ResultKind, TransitionKind, TransitionRecord};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Keys projected out of state data when none are configured.
pub const DEFAULT_DEBUG_LOG_KEYS: &[&str] = &["state"];

/// Time format of a row: `hh:mm:ss.mmm AM/PM`.
const TIME_FORMAT: &str = "%I:%M:%S%.3f %p";

/// Display category of a row, used to style it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayResult {
    Success,
    Override,
    Reset,
    Error,
    Warning,
}

impl From<ResultKind> for DisplayResult {
    fn from(result: ResultKind) -> Self {
        match result {
            ResultKind::Success => Self::Success,
            ResultKind::Override => Self::Override,
            ResultKind::Reset => Self::Reset,
            ResultKind::InternalError | ResultKind::UnknownError => Self::Error,
            ResultKind::Filtered | ResultKind::Rejected | ResultKind::Unrecognized => {
                Self::Warning
            }
        }
    }
}

/// One row of the rendered debug log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DisplayRecord {
    pub time: String,
    #[serde(rename = "type")]
    pub kind: TransitionKind,
    pub data: String,
    pub message: String,
    pub result: DisplayResult,
}

/// Transform `records` (oldest first) into display rows, newest first.
///
/// String state data is shown verbatim. Any other data is reduced to the
/// entries named by `keys` and rendered as JSON with sorted keys and a
/// one-space indent.
///
/// # Example
///
/// ```rust
/// use fsm_binder::core::{ResultKind, TransitionKind, TransitionRecord};
/// use fsm_binder::debug_log::{process_debug_log, DisplayResult};
/// use serde_json::json;
///
/// let records = vec![TransitionRecord::new(
///     TransitionKind::ChangeState,
///     json!({ "state": "go", "timingMs": 7000 }),
///     ResultKind::Rejected,
///     "Cannot leave stop for go",
/// )];
///
/// let rows = process_debug_log(&records, &["state"]);
/// assert_eq!(rows[0].data, "{\n \"state\": \"go\"\n}");
/// assert_eq!(rows[0].result, DisplayResult::Warning);
/// ```
pub fn process_debug_log<K: AsRef<str>>(
    records: &[TransitionRecord],
    keys: &[K],
) -> Vec<DisplayRecord> {
    let mut ordered: Vec<(usize, &TransitionRecord)> = records.iter().enumerate().collect();
    ordered.sort_by_key(|(index, record)| (Reverse(record.timestamp), Reverse(*index)));

    ordered
        .into_iter()
        .map(|(_, record)| DisplayRecord {
            time: record.timestamp.format(TIME_FORMAT).to_string(),
            kind: record.kind,
            data: format_state_data(&record.state_data, keys),
            message: record.message.clone(),
            result: record.result.into(),
        })
        .collect()
}

fn format_state_data<K: AsRef<str>>(data: &Value, keys: &[K]) -> String {
    if let Value::String(text) = data {
        return text.clone();
    }

    let projected: BTreeMap<&str, &Value> = keys
        .iter()
        .filter_map(|key| {
            let key = key.as_ref();
            data.get(key).map(|value| (key, value))
        })
        .collect();

    to_indented_json(&projected)
}

fn to_indented_json<T: Serialize>(value: &T) -> String {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b" "));
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8(out).unwrap_or_default(),
        Err(err) => format!("<unserializable: {err}>"),
    }
}
