use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const SIGNAL_CAPACITY: usize = 16;

/// Lifecycle notifications of one adapter.
///
/// `destroyed` fires once and stays fired. The broadcast signals carry no
/// payload; a lagging receiver still learns that at least one event
/// happened.
#[derive(Debug)]
pub(crate) struct Signals {
    pub(crate) destroyed: CancellationToken,
    pub(crate) transition_completed: broadcast::Sender<()>,
    pub(crate) override_applied: broadcast::Sender<()>,
}

impl Signals {
    pub(crate) fn new() -> Self {
        let (transition_completed, _) = broadcast::channel(SIGNAL_CAPACITY);
        let (override_applied, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            destroyed: CancellationToken::new(),
            transition_completed,
            override_applied,
        }
    }

    pub(crate) fn notify_transition_completed(&self) {
        // No receivers is fine.
        let _ = self.transition_completed.send(());
    }

    pub(crate) fn notify_override_applied(&self) {
        let _ = self.override_applied.send(());
    }
}
