//! Traffic light fixture shared by the integration tests.

#![allow(dead_code)]

use fsm_binder::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;

state_enum! {
    pub enum Light {
        Go = "go",
        PrepareToStop = "prepareToStop",
        Stop = "stop",
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    pub go_ms: u64,
    pub prepare_to_stop_ms: u64,
}

pub const TIMINGS: Timings = Timings {
    go_ms: 7000,
    prepare_to_stop_ms: 3000,
};

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum LightData {
    Go { timings: Timings },
    PrepareToStop { timings: Timings },
    Stop { timings: Timings },
}

impl StateData for LightData {
    type State = Light;

    fn state(&self) -> Light {
        match self {
            Self::Go { .. } => Light::Go,
            Self::PrepareToStop { .. } => Light::PrepareToStop,
            Self::Stop { .. } => Light::Stop,
        }
    }
}

impl LightData {
    pub fn go() -> Self {
        Self::Go { timings: TIMINGS }
    }

    pub fn prepare_to_stop() -> Self {
        Self::PrepareToStop { timings: TIMINGS }
    }

    pub fn stop() -> Self {
        Self::Stop { timings: TIMINGS }
    }

    pub fn timings(&self) -> Timings {
        match self {
            Self::Go { timings } | Self::PrepareToStop { timings } | Self::Stop { timings } => {
                *timings
            }
        }
    }

    /// Same timings, different state.
    pub fn with_state(&self, state: Light) -> Self {
        let timings = self.timings();
        match state {
            Light::Go => Self::Go { timings },
            Light::PrepareToStop => Self::PrepareToStop { timings },
            Light::Stop => Self::Stop { timings },
        }
    }

    /// How long to stay in this state before advancing on its own.
    pub fn dwell(&self) -> Option<Duration> {
        match self {
            Self::Go { timings } => Some(Duration::from_millis(timings.go_ms)),
            Self::PrepareToStop { timings } => {
                Some(Duration::from_millis(timings.prepare_to_stop_ms))
            }
            Self::Stop { .. } => None,
        }
    }
}

pub fn light_map() -> StateMap<Light> {
    StateMap::new()
        .initial([Light::Go, Light::Stop])
        .state(Light::Go, [Light::PrepareToStop])
        .state(Light::PrepareToStop, [Light::Stop])
        .state(Light::Stop, [Light::Go])
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Let spawned tasks run. The paused clock only advances once every task
/// is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Advance to the first allowed next state after each timed state's dwell.
pub fn spawn_auto_advance(adapter: &Adapter<LightData>) -> JoinHandle<()> {
    let adapter = adapter.clone();
    let destroyed = adapter.destroyed();
    let mut states = adapter.state_stream();
    tokio::spawn(async move {
        let mut entered = None;
        loop {
            let current = states.borrow_and_update().clone();
            if current.state() != entered {
                entered = current.state();
                if let Some(dwell) = current.data.data().and_then(LightData::dwell) {
                    adapter.schedule_transition(dwell, |current| {
                        let next = current.first_allowed()?;
                        current.data.data().map(|data| data.with_state(next))
                    });
                }
            }

            tokio::select! {
                biased;
                _ = destroyed.cancelled() => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Successful transitions into `state` recorded in `adapter`'s log.
pub fn entries_into(adapter: &Adapter<LightData>, state: Light) -> usize {
    adapter
        .debug_log()
        .records()
        .iter()
        .filter(|record| record.result.is_committed())
        .filter(|record| record.state_data["state"] == state.name())
        .count()
}
