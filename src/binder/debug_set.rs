use crate::debug_log::{DisplayRecord, DEFAULT_DEBUG_LOG_KEYS};
use crate::diagram::{DiagramRenderer, RenderQueue};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Where binders publish their debug log rows and diagram text.
///
/// Several binders may share one set; the last publish wins. `None` means
/// the output is switched off.
#[derive(Clone)]
pub struct DebugSet {
    inner: Arc<DebugSetInner>,
}

struct DebugSetInner {
    keys: Vec<String>,
    log: watch::Sender<Option<Vec<DisplayRecord>>>,
    diagram: watch::Sender<Option<String>>,
}

impl Default for DebugSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DebugSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugSet")
            .field("keys", &self.inner.keys)
            .finish_non_exhaustive()
    }
}

impl DebugSet {
    /// A set projecting the `state` key of each record.
    pub fn new() -> Self {
        Self::with_keys(DEFAULT_DEBUG_LOG_KEYS.iter().copied())
    }

    /// A set projecting `keys` out of each record's state data.
    pub fn with_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let (log, _) = watch::channel(None);
        let (diagram, _) = watch::channel(None);
        Self {
            inner: Arc::new(DebugSetInner {
                keys: keys.into_iter().map(Into::into).collect(),
                log,
                diagram,
            }),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.inner.keys
    }

    pub fn debug_log(&self) -> watch::Receiver<Option<Vec<DisplayRecord>>> {
        self.inner.log.subscribe()
    }

    pub fn diagram(&self) -> watch::Receiver<Option<String>> {
        self.inner.diagram.subscribe()
    }

    /// Feed every published diagram into `renderer`.
    ///
    /// The returned queue exposes the rendered output; the task ends when
    /// this set and all its clones are dropped.
    pub fn render_with(
        &self,
        renderer: Arc<dyn DiagramRenderer>,
    ) -> (Arc<RenderQueue>, JoinHandle<()>) {
        let queue = Arc::new(RenderQueue::new(renderer));
        let task = queue.follow(self.diagram());
        (queue, task)
    }

    pub(crate) fn publish_log(&self, rows: Option<Vec<DisplayRecord>>) {
        self.inner.log.send_replace(rows);
    }

    pub(crate) fn publish_diagram(&self, text: Option<String>) {
        self.inner.diagram.send_replace(text);
    }
}
