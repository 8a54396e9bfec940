//! Declarative description of the states a machine may move between.

use crate::config::DiagramDirection;
use crate::core::State;
use std::fmt::Write;

/// The states of a machine and the transitions allowed out of each.
///
/// Allowed successors keep their declaration order; the first one is the
/// conventional default next state.
///
/// # Example
///
/// ```rust
/// use fsm_binder::engine::StateMap;
/// use fsm_binder::state_enum;
///
/// state_enum! {
///     enum Light { Go = "go", PrepareToStop = "prepareToStop", Stop = "stop" }
/// }
///
/// let map = StateMap::new()
///     .initial([Light::Go, Light::Stop])
///     .state(Light::Go, [Light::PrepareToStop])
///     .state(Light::PrepareToStop, [Light::Stop])
///     .state(Light::Stop, [Light::Go]);
///
/// assert_eq!(map.can_leave_to(None), &[Light::Go, Light::Stop]);
/// assert_eq!(map.can_leave_to(Some(Light::Go)), &[Light::PrepareToStop]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateMap<S: State> {
    initial: Vec<S>,
    states: Vec<(S, Vec<S>)>,
}

impl<S: State> Default for StateMap<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State> StateMap<S> {
    pub fn new() -> Self {
        Self {
            initial: Vec::new(),
            states: Vec::new(),
        }
    }

    /// States that may be entered from the uninitialized sentinel.
    pub fn initial(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.initial = states.into_iter().collect();
        self
    }

    /// Declare `state` and the states it may leave to. Declaring a state
    /// twice replaces its successors.
    pub fn state(mut self, state: S, can_leave_to: impl IntoIterator<Item = S>) -> Self {
        let successors: Vec<S> = can_leave_to.into_iter().collect();
        match self.states.iter_mut().find(|(s, _)| *s == state) {
            Some((_, existing)) => *existing = successors,
            None => self.states.push((state, successors)),
        }
        self
    }

    /// Allowed successors of `from`; `None` is the uninitialized sentinel.
    pub fn can_leave_to(&self, from: Option<S>) -> &[S] {
        match from {
            None => &self.initial,
            Some(state) => self
                .states
                .iter()
                .find(|(s, _)| *s == state)
                .map(|(_, successors)| successors.as_slice())
                .unwrap_or(&[]),
        }
    }

    pub fn allows(&self, from: Option<S>, to: S) -> bool {
        self.can_leave_to(from).contains(&to)
    }

    /// Declared states in declaration order.
    pub fn states(&self) -> impl Iterator<Item = S> + '_ {
        self.states.iter().map(|(s, _)| *s)
    }

    /// Render the map as a Mermaid state diagram, optionally highlighting
    /// the current state.
    pub fn diagram_definition(&self, direction: DiagramDirection, highlight: Option<S>) -> String {
        let mut out = String::from("stateDiagram-v2\n");
        let _ = writeln!(out, "    direction {}", direction.as_str());
        for state in &self.initial {
            let _ = writeln!(out, "    [*] --> {}", state.name());
        }
        for (state, successors) in &self.states {
            for next in successors {
                let _ = writeln!(out, "    {} --> {}", state.name(), next.name());
            }
            if state.is_final() {
                let _ = writeln!(out, "    {} --> [*]", state.name());
            }
        }
        if let Some(state) = highlight {
            out.push_str("    classDef highlight font-weight:bold,stroke-width:3px\n");
            let _ = writeln!(out, "    class {} highlight", state.name());
        }
        out
    }
}
