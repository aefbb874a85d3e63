//! Per-reference hover state. One subscription belongs to one rendered
//! reference element; re-rendering drops it and creates a new one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::{CitationEngine, PresentationSink, Resolution};
use crate::types::ReferenceAnchor;

pub struct HoverSubscription {
    engine: Arc<CitationEngine>,
    anchor: ReferenceAnchor,
    sink: Arc<dyn PresentationSink>,
    hovered: Arc<AtomicBool>,
    // Bumped on every enter and leave so a resolution started by an earlier
    // hover never displays during a later one.
    generation: Arc<AtomicU64>,
}

impl HoverSubscription {
    pub fn new(
        engine: Arc<CitationEngine>,
        anchor: ReferenceAnchor,
        sink: Arc<dyn PresentationSink>,
    ) -> Self {
        Self {
            engine,
            anchor,
            sink,
            hovered: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn anchor(&self) -> &ReferenceAnchor {
        &self.anchor
    }

    pub fn is_hovered(&self) -> bool {
        self.hovered.load(Ordering::SeqCst)
    }

    /// Marks the reference hovered and starts resolving it in the background.
    /// The result is displayed only if this hover is still the current one.
    /// Must be called from within a tokio runtime.
    pub fn enter(&self) -> JoinHandle<Resolution> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.hovered.store(true, Ordering::SeqCst);
        debug!(link = self.anchor.target(), ticket, "hover entered");

        let engine = Arc::clone(&self.engine);
        let sink = Arc::clone(&self.sink);
        let anchor = self.anchor.clone();
        let hovered = Arc::clone(&self.hovered);
        let generation = Arc::clone(&self.generation);

        tokio::spawn(async move {
            let still_relevant = move || {
                hovered.load(Ordering::SeqCst) && generation.load(Ordering::SeqCst) == ticket
            };
            engine.resolve_anchor(&anchor, &still_relevant, sink.as_ref()).await
        })
    }

    pub fn leave(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.hovered.store(false, Ordering::SeqCst);
        debug!(link = self.anchor.target(), "hover left");
    }
}

impl Drop for HoverSubscription {
    fn drop(&mut self) {
        self.leave();
    }
}
