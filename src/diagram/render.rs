use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors reported by a diagram renderer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("Invalid diagram definition: {0}")]
    InvalidDefinition(String),

    #[error("Diagram renderer failed: {0}")]
    Failed(String),
}

/// Turns diagram text into a rendered form such as SVG.
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    async fn render(&self, definition: &str) -> Result<String, RenderError>;
}

/// Keeps at most one render in flight per diagram.
///
/// A newer definition aborts the render still running for an older one, so
/// the output never moves backwards. Failed renders are logged and leave the
/// previous output in place. Requires a tokio runtime.
pub struct RenderQueue {
    renderer: Arc<dyn DiagramRenderer>,
    output: Arc<watch::Sender<Option<String>>>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl RenderQueue {
    pub fn new(renderer: Arc<dyn DiagramRenderer>) -> Self {
        let (output, _) = watch::channel(None);
        Self {
            renderer,
            output: Arc::new(output),
            in_flight: Mutex::new(None),
        }
    }

    /// The most recent rendered output.
    pub fn output(&self) -> watch::Receiver<Option<String>> {
        self.output.subscribe()
    }

    /// Render `definition`, superseding any render still in flight.
    /// `None` cancels the in-flight render and clears the output.
    pub fn request(&self, definition: Option<String>) {
        let mut in_flight = self.in_flight.lock();
        if let Some(previous) = in_flight.take() {
            previous.abort();
        }

        let Some(definition) = definition else {
            self.output.send_replace(None);
            return;
        };

        let renderer = Arc::clone(&self.renderer);
        let output = Arc::clone(&self.output);
        *in_flight = Some(tokio::spawn(async move {
            match renderer.render(&definition).await {
                Ok(rendered) => {
                    output.send_replace(Some(rendered));
                }
                Err(err) => warn!(error = %err, "Diagram render failed"),
            }
        }));
    }

    /// Render every definition published on `definitions` until its sender
    /// is dropped.
    pub fn follow(self: &Arc<Self>, mut definitions: watch::Receiver<Option<String>>) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let definition = definitions.borrow_and_update().clone();
                queue.request(definition);
                if definitions.changed().await.is_err() {
                    debug!("Diagram source closed");
                    break;
                }
            }
        })
    }
}

impl Drop for RenderQueue {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Renderer whose latency depends on the definition length.
    struct SlowRenderer;

    #[async_trait]
    impl DiagramRenderer for SlowRenderer {
        async fn render(&self, definition: &str) -> Result<String, RenderError> {
            if definition.is_empty() {
                return Err(RenderError::InvalidDefinition("empty".into()));
            }
            tokio::time::sleep(Duration::from_millis(definition.len() as u64 * 10)).await;
            Ok(format!("<svg>{definition}</svg>"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn newer_definition_supersedes_slow_one() {
        let queue = RenderQueue::new(Arc::new(SlowRenderer));
        let mut output = queue.output();

        queue.request(Some("a long and slow definition".into()));
        queue.request(Some("quick".into()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(output.has_changed().unwrap());
        assert_eq!(
            output.borrow_and_update().as_deref(),
            Some("<svg>quick</svg>")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_render_keeps_previous_output() {
        let queue = RenderQueue::new(Arc::new(SlowRenderer));
        let output = queue.output();

        queue.request(Some("ok".into()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        queue.request(Some(String::new()));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(output.borrow().as_deref(), Some("<svg>ok</svg>"));
    }

    #[tokio::test(start_paused = true)]
    async fn none_clears_output() {
        let queue = RenderQueue::new(Arc::new(SlowRenderer));
        let output = queue.output();

        queue.request(Some("ok".into()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        queue.request(None);

        assert!(output.borrow().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn follow_renders_each_published_definition() {
        let queue = Arc::new(RenderQueue::new(Arc::new(SlowRenderer)));
        let output = queue.output();
        let (source, definitions) = watch::channel(Some("one".to_string()));

        let task = queue.follow(definitions);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(output.borrow().as_deref(), Some("<svg>one</svg>"));

        source.send_replace(Some("two".to_string()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(output.borrow().as_deref(), Some("<svg>two</svg>"));

        drop(source);
        task.await.unwrap();
    }
}
