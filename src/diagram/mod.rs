//! State diagram text and its rendering.
//!
//! Diagram definitions are plain Mermaid text produced by the engine. An
//! adapter memoizes them per highlighted state in a [`DiagramCache`]; turning
//! text into an image is delegated to a [`DiagramRenderer`] driven by a
//! [`RenderQueue`].

mod render;

pub use render::{DiagramRenderer, RenderError, RenderQueue};

use std::collections::HashMap;

/// Memo of diagram text keyed by the name of the highlighted state.
///
/// Entries never go stale on their own; whoever changes an input of the
/// diagram (direction, forced state) clears the cache.
#[derive(Debug, Default)]
pub struct DiagramCache {
    entries: HashMap<String, String>,
}

impl DiagramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, highlight: &str) -> Option<String> {
        self.entries.get(highlight).cloned()
    }

    /// Store `text` for `highlight` unless an entry already exists, and
    /// return the entry that ends up cached.
    pub fn insert(&mut self, highlight: &str, text: String) -> String {
        self.entries
            .entry(highlight.to_string())
            .or_insert(text)
            .clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
