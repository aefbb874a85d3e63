//! One resolution, end to end: window, segment, parse, resolve, normalize,
//! then present if the caller still cares.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, debug, info_span, warn};

use crate::config::ResolverConfig;
use crate::layout::LayoutSource;
use crate::references::{CitationSegmenter, IdentifierParser, Identifiers};
use crate::resolver::{ResolutionMethod, ResolverChain, normalize};
use crate::types::{MetadataRecord, ReferenceAnchor};

/// Receives finished records. Implementations should re-check
/// `still_relevant` if displaying is itself slow.
pub trait PresentationSink: Send + Sync {
    fn display(&self, record: &MetadataRecord, still_relevant: &dyn Fn() -> bool);
}

/// Why nothing was displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Miss {
    /// The anchor links to a section, figure or similar.
    NotCitationLink,
    NoDestination,
    EmptyWindow,
    NoCitation,
    NoIdentifiers,
    /// Every ready stage was inconclusive.
    Exhausted,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Displayed {
        method: ResolutionMethod,
        record: MetadataRecord,
    },
    /// A record was found but the caller had moved on.
    Suppressed {
        method: ResolutionMethod,
        record: MetadataRecord,
    },
    NoResult { miss: Miss },
}

impl Resolution {
    pub fn record(&self) -> Option<&MetadataRecord> {
        match self {
            Self::Displayed { record, .. } | Self::Suppressed { record, .. } => Some(record),
            Self::NoResult { .. } => None,
        }
    }

    fn miss(miss: Miss) -> Self {
        Self::NoResult { miss }
    }
}

/// Shared, immutable pipeline. Each call is independent; clone the `Arc`
/// around it to resolve concurrently.
pub struct CitationEngine {
    config: ResolverConfig,
    layout: Option<Arc<dyn LayoutSource>>,
    segmenter: CitationSegmenter,
    parser: IdentifierParser,
    chain: ResolverChain,
}

impl CitationEngine {
    /// The keyed-search limit and ambiguity policy in `config` replace the
    /// chain's own, and the chain shares the parser's title patterns.
    pub fn new(config: ResolverConfig, chain: ResolverChain) -> Self {
        let parser = IdentifierParser::new(&config.parser);
        let chain = chain
            .with_titles(parser.battery().clone())
            .with_keyed_limit(config.sources.keyed_search_limit)
            .with_ambiguity(config.resolver.ambiguity);
        Self {
            segmenter: CitationSegmenter::new(config.segmenter.clone()),
            parser,
            layout: None,
            chain,
            config,
        }
    }

    /// Engine backed by the live arXiv, Semantic Scholar and CrossRef APIs.
    pub fn from_config(config: ResolverConfig) -> Self {
        let chain = ResolverChain::from_config(&config);
        Self::new(config, chain)
    }

    pub fn with_layout(mut self, layout: Arc<dyn LayoutSource>) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_parser(mut self, parser: IdentifierParser) -> Self {
        self.chain = std::mem::take(&mut self.chain).with_titles(parser.battery().clone());
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn parser(&self) -> &IdentifierParser {
        &self.parser
    }

    /// Everything before the network: link check, BibKey, window, segment, parse.
    pub async fn identify_anchor(&self, anchor: &ReferenceAnchor) -> Result<Identifiers, Miss> {
        if !anchor.is_citation_link() {
            debug!(link = anchor.target(), "not a citation link");
            return Err(Miss::NotCitationLink);
        }
        if let Some(ids) = self.parser.parse_anchor(anchor) {
            debug!("compact key in link target, skipping text extraction");
            return Ok(ids);
        }

        let Some(layout) = &self.layout else {
            debug!("no layout source attached");
            return Err(Miss::NoDestination);
        };
        let window = match layout.fragments_near(anchor, &self.config.window).await {
            Ok(Some(window)) => window,
            Ok(None) => return Err(Miss::NoDestination),
            Err(e) => {
                warn!(link = anchor.target(), error = %e, "layout lookup failed");
                return Err(Miss::NoDestination);
            }
        };
        if window.fragments.is_empty() {
            debug!(target_y = window.target_y, "no text near destination");
            return Err(Miss::EmptyWindow);
        }

        let citation = self
            .segmenter
            .segment(&window.fragments, Some(window.target_y))
            .ok_or(Miss::NoCitation)?;
        debug!(%citation, "citation segmented");
        self.parser.parse_citation(&citation).ok_or(Miss::NoIdentifiers)
    }

    /// Resolves the reference an internal link points at.
    pub async fn resolve_anchor(
        &self,
        anchor: &ReferenceAnchor,
        still_relevant: &(dyn Fn() -> bool + Send + Sync),
        sink: &dyn PresentationSink,
    ) -> Resolution {
        let span = info_span!("resolve", link = anchor.target());
        let work = async {
            let ids = self.identify_anchor(anchor).await?;
            self.lookup(&ids).await
        };
        self.finish(work, still_relevant, sink).instrument(span).await
    }

    /// Resolves a citation string directly, skipping the layout steps.
    pub async fn resolve_citation_text(
        &self,
        citation: &str,
        still_relevant: &(dyn Fn() -> bool + Send + Sync),
        sink: &dyn PresentationSink,
    ) -> Resolution {
        let span = info_span!("resolve", citation);
        let work = async {
            let ids = self.parser.parse_citation(citation).ok_or(Miss::NoIdentifiers)?;
            self.lookup(&ids).await
        };
        self.finish(work, still_relevant, sink).instrument(span).await
    }

    async fn lookup(&self, ids: &Identifiers) -> Result<(ResolutionMethod, MetadataRecord), Miss> {
        let resolved = self.chain.resolve(ids).await.ok_or(Miss::Exhausted)?;
        Ok((resolved.method, normalize(resolved.metadata)))
    }

    async fn finish(
        &self,
        work: impl Future<Output = Result<(ResolutionMethod, MetadataRecord), Miss>>,
        still_relevant: &(dyn Fn() -> bool + Send + Sync),
        sink: &dyn PresentationSink,
    ) -> Resolution {
        let outcome = match self.config.resolver.overall_timeout() {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs(), "resolution timed out");
                    Err(Miss::TimedOut)
                }
            },
            None => work.await,
        };

        let (method, record) = match outcome {
            Ok(found) => found,
            Err(miss) => {
                debug!(?miss, "no result");
                return Resolution::miss(miss);
            }
        };

        if !still_relevant() {
            debug!(title = %record.full_title, "no longer relevant, suppressing");
            return Resolution::Suppressed { method, record };
        }
        sink.display(&record, still_relevant);
        Resolution::Displayed { method, record }
    }
}
