//! Reference engine validating transitions against a state map.

use super::state_map::StateMap;
use super::{FsmEngine, StateStream};
use crate::config::DiagramDirection;
use crate::core::{
    CurrentState, ResultKind, Snapshot, State, StateData, TransitionKind, TransitionLog,
    TransitionRecord, UNINITIALIZED_STATE,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Engine that accepts a transition only when the state map allows it.
///
/// Every attempt, accepted or not, is appended to a bounded transition log
/// that travels with the state value it produced.
pub struct StateMapEngine<D: StateData> {
    state_map: StateMap<D::State>,
    inner: Mutex<Inner<D>>,
}

struct Inner<D: StateData> {
    current: CurrentState<D>,
    sender: Option<watch::Sender<CurrentState<D>>>,
    capacity: usize,
}

impl<D: StateData> Inner<D> {
    fn publish(&mut self, current: CurrentState<D>) {
        self.current = current;
        if let Some(sender) = &self.sender {
            sender.send_replace(self.current.clone());
        }
    }

    fn record_only(&mut self, record: TransitionRecord) {
        let log = self.current.log.record(record, self.capacity);
        let current = CurrentState {
            log,
            ..self.current.clone()
        };
        self.publish(current);
    }
}

impl<D: StateData> StateMapEngine<D> {
    pub fn new(state_map: StateMap<D::State>, debug_log_capacity: usize) -> Self {
        let current = CurrentState::uninitialized(state_map.can_leave_to(None).to_vec());
        let (sender, _) = watch::channel(current.clone());
        Self {
            state_map,
            inner: Mutex::new(Inner {
                current,
                sender: Some(sender),
                capacity: debug_log_capacity,
            }),
        }
    }

    pub fn state_map(&self) -> &StateMap<D::State> {
        &self.state_map
    }

    fn commit(&self, inner: &mut Inner<D>, data: D, log: TransitionLog) {
        let can_leave_to = self.state_map.can_leave_to(Some(data.state())).to_vec();
        inner.publish(CurrentState {
            data: Snapshot::Active(data),
            can_leave_to,
            log,
        });
    }
}

impl<D: StateData> FsmEngine<D> for StateMapEngine<D> {
    fn state_stream(&self) -> StateStream<D> {
        let inner = self.inner.lock();
        match &inner.sender {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = watch::channel(inner.current.clone());
                drop(sender);
                receiver
            }
        }
    }

    fn current_state(&self) -> CurrentState<D> {
        self.inner.lock().current.clone()
    }

    fn change_state(&self, next: D) -> ResultKind {
        let mut inner = self.inner.lock();
        let to = next.state();
        if inner.sender.is_none() {
            warn!(state = to.name(), "Change ignored: engine destroyed");
            return ResultKind::Rejected;
        }

        let from = inner.current.data.state();
        let from_name = inner.current.data.state_name();
        let kind = if from.is_none() {
            TransitionKind::Init
        } else {
            TransitionKind::ChangeState
        };

        if !self.state_map.allows(from, to) {
            debug!(from = from_name, to = to.name(), "Transition rejected");
            inner.record_only(TransitionRecord::new(
                kind,
                data_value(&next),
                ResultKind::Rejected,
                format!("Cannot leave {from_name} for {}", to.name()),
            ));
            return ResultKind::Rejected;
        }

        let record = TransitionRecord::new(
            kind,
            data_value(&next),
            ResultKind::Success,
            format!("{from_name} -> {}", to.name()),
        );
        let log = inner.current.log.record(record, inner.capacity);
        self.commit(&mut inner, next, log);
        ResultKind::Success
    }

    fn update_state(&self, data: D) -> ResultKind {
        let mut inner = self.inner.lock();
        let state = data.state();
        if inner.sender.is_none() {
            warn!(state = state.name(), "Update ignored: engine destroyed");
            return ResultKind::Rejected;
        }

        let current_name = inner.current.data.state_name();
        if inner.current.data.state() != Some(state) {
            inner.record_only(TransitionRecord::new(
                TransitionKind::UpdateState,
                data_value(&data),
                ResultKind::Rejected,
                format!("Cannot update {current_name} with data for {}", state.name()),
            ));
            return ResultKind::Rejected;
        }

        if inner.current.data.data() == Some(&data) {
            inner.record_only(TransitionRecord::new(
                TransitionKind::UpdateState,
                data_value(&data),
                ResultKind::Filtered,
                "State data unchanged",
            ));
            return ResultKind::Filtered;
        }

        let record = TransitionRecord::new(
            TransitionKind::UpdateState,
            data_value(&data),
            ResultKind::Success,
            format!("{current_name} updated"),
        );
        let log = inner.current.log.record(record, inner.capacity);
        self.commit(&mut inner, data, log);
        ResultKind::Success
    }

    fn override_state(&self, data: D, reset_debug_log: bool) -> ResultKind {
        let mut inner = self.inner.lock();
        let to = data.state();
        if inner.sender.is_none() {
            warn!(state = to.name(), "Override ignored: engine destroyed");
            return ResultKind::Rejected;
        }

        let from_name = inner.current.data.state_name();
        let log = if reset_debug_log {
            TransitionLog::new().record(
                TransitionRecord::new(
                    TransitionKind::Reset,
                    snapshot_value(&inner.current.data),
                    ResultKind::Reset,
                    "Debug log reset by override",
                ),
                inner.capacity,
            )
        } else {
            inner.current.log.clone()
        };
        let record = TransitionRecord::new(
            TransitionKind::Override,
            data_value(&data),
            ResultKind::Override,
            format!("{from_name} overridden with {}", to.name()),
        );
        let log = log.record(record, inner.capacity);
        self.commit(&mut inner, data, log);
        ResultKind::Override
    }

    fn state_diagram_definition(
        &self,
        direction: DiagramDirection,
        highlight: Option<D::State>,
    ) -> String {
        self.state_map.diagram_definition(direction, highlight)
    }

    fn debug_log(&self) -> TransitionLog {
        self.inner.lock().current.log.clone()
    }

    fn cap_debug_log(&self, max_len: usize) {
        let mut inner = self.inner.lock();
        inner.capacity = max_len;
        let log = inner.current.log.capped(max_len);
        inner.current.log = log.clone();
        if let Some(sender) = &inner.sender {
            // Not a transition: update the stored value without waking readers.
            sender.send_if_modified(|value| {
                value.log = log;
                false
            });
        }
    }

    fn destroy(&self) {
        if self.inner.lock().sender.take().is_some() {
            debug!("Engine destroyed");
        }
    }

    fn is_destroyed(&self) -> bool {
        self.inner.lock().sender.is_none()
    }
}

fn snapshot_value<D: StateData>(snapshot: &Snapshot<D>) -> Value {
    match snapshot {
        Snapshot::Uninitialized => Value::String(UNINITIALIZED_STATE.to_string()),
        Snapshot::Active(data) => data_value(data),
    }
}

fn data_value<T: Serialize>(data: &T) -> Value {
    serde_json::to_value(data)
        .unwrap_or_else(|err| Value::String(format!("Unserializable state data: {err}")))
}
