use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AmbiguityPolicy, ResolverConfig};
use crate::error::Result;
use crate::identifiers::{ArxivId, BibKey};
use crate::references::{Identifiers, TitleBattery};
use crate::sources::{
    ArxivSource, CitationTextSource, CrossRefSource, DirectIdSource, KeyedEntry, KeyedSearchSource,
    SemanticScholarSource, TitleMatchSource,
};
use crate::types::PartialMetadata;

/// Which stage produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    DirectArxiv,
    KeyedSearch,
    TitleMatch,
    Bibliographic,
}

/// One step of the chain. [`Stage::ORDER`] is the only order they ever run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DirectId,
    KeyedSearch,
    TitleMatch,
    Bibliographic,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [
        Stage::DirectId,
        Stage::KeyedSearch,
        Stage::TitleMatch,
        Stage::Bibliographic,
    ];

    pub fn method(self) -> ResolutionMethod {
        match self {
            Self::DirectId => ResolutionMethod::DirectArxiv,
            Self::KeyedSearch => ResolutionMethod::KeyedSearch,
            Self::TitleMatch => ResolutionMethod::TitleMatch,
            Self::Bibliographic => ResolutionMethod::Bibliographic,
        }
    }

    /// Whether the identifiers carry this stage's kind of input. A title
    /// stage with no candidate titles is inconclusive without a lookup.
    pub fn is_ready(self, ids: &Identifiers) -> bool {
        matches!(
            (self, ids),
            (Self::DirectId, Identifiers::Arxiv(_))
                | (Self::KeyedSearch, Identifiers::Keyed(_))
                | (Self::TitleMatch | Self::Bibliographic, Identifiers::FreeText { .. })
        )
    }
}

/// Metadata plus the stage that accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub method: ResolutionMethod,
    pub metadata: PartialMetadata,
}

/// Entries agreeing with the key on year, first-author surname and title prefix.
pub fn filter_keyed(entries: Vec<KeyedEntry>, key: &BibKey) -> Vec<KeyedEntry> {
    entries
        .into_iter()
        .filter(|entry| key.matches(&entry.year, &entry.author_surname, &entry.title))
        .collect()
}

/// Ordered source stages. Stages run one at a time; a stage runs only when
/// every earlier one was inconclusive and its own input and source exist.
/// Source errors make a stage inconclusive and never abort the chain.
pub struct ResolverChain {
    direct_id: Option<Arc<dyn DirectIdSource>>,
    keyed: Option<Arc<dyn KeyedSearchSource>>,
    title_match: Option<Arc<dyn TitleMatchSource>>,
    bibliographic: Option<Arc<dyn CitationTextSource>>,
    titles: Arc<TitleBattery>,
    keyed_limit: u32,
    ambiguity: AmbiguityPolicy,
}

impl Default for ResolverChain {
    fn default() -> Self {
        Self {
            direct_id: None,
            keyed: None,
            title_match: None,
            bibliographic: None,
            titles: Arc::new(TitleBattery::default()),
            keyed_limit: 50,
            ambiguity: AmbiguityPolicy::default(),
        }
    }
}

impl ResolverChain {
    /// An empty chain; attach sources with the `with_*` builders.
    pub fn new() -> Self {
        Self::default()
    }

    /// arXiv for Direct-ID and keyed search, Semantic Scholar for title
    /// matching, CrossRef as the bibliographic fallback.
    pub fn from_config(config: &ResolverConfig) -> Self {
        let arxiv = Arc::new(ArxivSource::new(config));
        Self::new()
            .with_direct_id(arxiv.clone())
            .with_keyed_search(arxiv)
            .with_title_match(Arc::new(SemanticScholarSource::new(config)))
            .with_bibliographic(Arc::new(CrossRefSource::new(config)))
            .with_titles(Arc::new(TitleBattery::with_min_len(config.parser.min_title_len)))
            .with_keyed_limit(config.sources.keyed_search_limit)
            .with_ambiguity(config.resolver.ambiguity)
    }

    pub fn with_direct_id(mut self, source: Arc<dyn DirectIdSource>) -> Self {
        self.direct_id = Some(source);
        self
    }

    pub fn with_keyed_search(mut self, source: Arc<dyn KeyedSearchSource>) -> Self {
        self.keyed = Some(source);
        self
    }

    pub fn with_title_match(mut self, source: Arc<dyn TitleMatchSource>) -> Self {
        self.title_match = Some(source);
        self
    }

    pub fn with_bibliographic(mut self, source: Arc<dyn CitationTextSource>) -> Self {
        self.bibliographic = Some(source);
        self
    }

    /// Patterns that turn free-text citations into candidate titles.
    pub fn with_titles(mut self, titles: Arc<TitleBattery>) -> Self {
        self.titles = titles;
        self
    }

    pub fn with_keyed_limit(mut self, limit: u32) -> Self {
        self.keyed_limit = limit;
        self
    }

    pub fn with_ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    /// First accepted result in stage order, or `None` once every ready
    /// stage was inconclusive.
    pub async fn resolve(&self, ids: &Identifiers) -> Option<Resolved> {
        for stage in Stage::ORDER {
            if !stage.is_ready(ids) {
                continue;
            }
            debug!(?stage, "running resolver stage");
            if let Some(metadata) = self.run(stage, ids).await {
                let title = metadata.title.as_deref().unwrap_or_default();
                info!(?stage, title, "record accepted");
                return Some(Resolved {
                    method: stage.method(),
                    metadata,
                });
            }
        }
        debug!("resolver stages exhausted");
        None
    }

    async fn run(&self, stage: Stage, ids: &Identifiers) -> Option<PartialMetadata> {
        match (stage, ids) {
            (Stage::DirectId, Identifiers::Arxiv(id)) => self.direct(id).await,
            (Stage::KeyedSearch, Identifiers::Keyed(key)) => self.keyed(key).await,
            (Stage::TitleMatch, Identifiers::FreeText { citation }) => {
                self.title_match(citation).await
            }
            (Stage::Bibliographic, Identifiers::FreeText { citation }) => {
                self.bibliographic(citation).await
            }
            _ => None,
        }
    }

    async fn direct(&self, id: &ArxivId) -> Option<PartialMetadata> {
        let source = self.direct_id.as_ref()?;
        accept(source.name(), source.by_identifier(id).await)
    }

    async fn keyed(&self, key: &BibKey) -> Option<PartialMetadata> {
        let source = self.keyed.as_ref()?;
        let entries = match source
            .search_by_title_author(&key.title_prefix, &key.author, self.keyed_limit)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    source = source.name(),
                    %key,
                    transient = e.is_transient(),
                    error = %e,
                    "keyed search failed"
                );
                return None;
            }
        };

        let total = entries.len();
        let mut matches = filter_keyed(entries, key);
        debug!(%key, total, matched = matches.len(), "keyed search filtered");
        match (matches.len(), self.ambiguity) {
            (0, _) => None,
            (1, _) | (_, AmbiguityPolicy::First) => Some(matches.swap_remove(0).into_metadata()),
            (n, AmbiguityPolicy::Fallthrough) => {
                debug!(%key, matches = n, "ambiguous keyed search, falling through");
                None
            }
        }
    }

    async fn title_match(&self, citation: &str) -> Option<PartialMetadata> {
        let source = self.title_match.as_ref()?;
        for title in self.titles.candidates(citation) {
            if let Some(metadata) = accept(source.name(), source.match_by_title(&title).await) {
                return Some(metadata);
            }
        }
        None
    }

    /// Each candidate title in turn, or the whole citation when there are none.
    async fn bibliographic(&self, citation: &str) -> Option<PartialMetadata> {
        let source = self.bibliographic.as_ref()?;
        let mut tried = false;
        for title in self.titles.candidates(citation) {
            tried = true;
            let found = source.search_by_citation_text(&title).await;
            if let Some(metadata) = accept(source.name(), found) {
                return Some(metadata);
            }
        }
        if tried {
            return None;
        }
        accept(source.name(), source.search_by_citation_text(citation).await)
    }
}

fn accept(source: &str, result: Result<Option<PartialMetadata>>) -> Option<PartialMetadata> {
    match result {
        Ok(found) => {
            if found.is_none() {
                debug!(source, "no match");
            }
            found
        }
        Err(e) => {
            warn!(source, transient = e.is_transient(), error = %e, "source lookup failed");
            None
        }
    }
}
