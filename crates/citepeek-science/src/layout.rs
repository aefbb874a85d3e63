//! Text window extraction around a citation link's destination.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WindowConfig;
use crate::error::{Result, ScienceError};
use crate::types::{Destination, ReferenceAnchor, TextFragment};

/// Fragments near a destination, plus the coordinate they were windowed around.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub target_y: f64,
    pub fragments: Vec<TextFragment>,
}

/// Supplies positioned page text. Implemented by whatever renders the document.
#[async_trait]
pub trait LayoutSource: Send + Sync {
    /// Where the anchor's internal link points, if it resolves.
    async fn destination(&self, anchor: &ReferenceAnchor) -> Result<Option<Destination>>;

    /// Every text fragment on a page, in any order.
    async fn page_fragments(&self, page: u32) -> Result<Vec<TextFragment>>;

    /// Resolves the destination (an explicit one on the anchor wins) and
    /// windows the page's fragments around it. `None` when the destination
    /// cannot be resolved.
    async fn fragments_near(
        &self,
        anchor: &ReferenceAnchor,
        bounds: &WindowConfig,
    ) -> Result<Option<Window>> {
        let destination = match anchor.destination {
            Some(destination) => Some(destination),
            None => self.destination(anchor).await?,
        };
        let Some(destination) = destination else {
            debug!(link = anchor.target(), "anchor destination did not resolve");
            return Ok(None);
        };

        let fragments = self.page_fragments(destination.page).await?;
        Ok(Some(Window {
            target_y: destination.y,
            fragments: extract_window(fragments, destination.y, bounds),
        }))
    }
}

/// Keeps fragments with `-below < y - y0 < above`.
pub fn extract_window(
    fragments: Vec<TextFragment>,
    target_y: f64,
    bounds: &WindowConfig,
) -> Vec<TextFragment> {
    fragments
        .into_iter()
        .filter(|fragment| {
            let dy = fragment.y - target_y;
            dy < bounds.above && dy > -bounds.below
        })
        .collect()
}

// ─── StaticLayout ─────────────────────────────────────────────────────────────

/// A pre-extracted document: named destinations and per-page fragments.
///
/// ```json
/// { "destinations": { "cite.smith2019deep": { "page": 9, "x": 72.0, "y": 640.0 } },
///   "pages": { "9": [ { "text": "[1] J. Smith.", "x": 72.0, "y": 640.0 } ] } }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticLayout {
    #[serde(default)]
    pub destinations: HashMap<String, Destination>,
    #[serde(default)]
    pub pages: HashMap<u32, Vec<TextFragment>>,
}

impl StaticLayout {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ScienceError::Layout(format!("invalid layout: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

#[async_trait]
impl LayoutSource for StaticLayout {
    async fn destination(&self, anchor: &ReferenceAnchor) -> Result<Option<Destination>> {
        Ok(self.destinations.get(anchor.target()).copied())
    }

    async fn page_fragments(&self, page: u32) -> Result<Vec<TextFragment>> {
        self.pages
            .get(&page)
            .cloned()
            .ok_or_else(|| ScienceError::Layout(format!("page {page} not in layout")))
    }
}
