//! Citepeek Science: resolves in-document citation links into bibliographic metadata.

pub mod error;
pub mod http;
pub mod config;
pub mod identifiers;
pub mod types;
pub mod layout;
pub mod references;
pub mod sources;
pub mod resolver;
pub mod engine;
pub mod subscription;

pub use error::{Result, ScienceError};
pub use config::ResolverConfig;
pub use types::{
    DatePreposition, Destination, MetadataRecord, PartialMetadata, RecordDate, ReferenceAnchor,
    TextFragment,
};
pub use engine::{CitationEngine, Miss, PresentationSink, Resolution};
pub use resolver::ResolutionMethod;
pub use subscription::HoverSubscription;
