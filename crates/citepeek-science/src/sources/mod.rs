use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identifiers::ArxivId;
use crate::types::{PartialMetadata, RecordDate};

pub mod arxiv;
pub mod crossref;
pub mod semantic_scholar;

pub use arxiv::ArxivSource;
pub use crossref::CrossRefSource;
pub use semantic_scholar::SemanticScholarSource;

/// Single-item lookup by identifier.
#[async_trait]
pub trait DirectIdSource: Send + Sync {
    fn name(&self) -> &str;
    async fn by_identifier(&self, id: &ArxivId) -> Result<Option<PartialMetadata>>;
}

/// Title-prefix + author search returning a batch to filter locally.
#[async_trait]
pub trait KeyedSearchSource: Send + Sync {
    fn name(&self) -> &str;
    async fn search_by_title_author(
        &self,
        title_prefix: &str,
        author: &str,
        limit: u32,
    ) -> Result<Vec<KeyedEntry>>;
}

/// Best match for a paper title.
#[async_trait]
pub trait TitleMatchSource: Send + Sync {
    fn name(&self) -> &str;
    async fn match_by_title(&self, title: &str) -> Result<Option<PartialMetadata>>;
}

/// Best match for free bibliographic text.
#[async_trait]
pub trait CitationTextSource: Send + Sync {
    fn name(&self) -> &str;
    async fn search_by_citation_text(&self, text: &str) -> Result<Option<PartialMetadata>>;
}

/// One keyed-search hit. `year` is whatever date string the source has; the
/// filter only checks that it contains the wanted year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyedEntry {
    pub title: String,
    pub author_surname: String,
    pub year: String,
    pub link: Option<String>,
    pub abstract_text: Option<String>,
    pub date: Option<RecordDate>,
    pub authors: Vec<String>,
}

impl KeyedEntry {
    pub fn into_metadata(self) -> PartialMetadata {
        PartialMetadata {
            link: self.link,
            title: Some(self.title),
            abstract_text: self.abstract_text,
            date: self.date,
            authors: (!self.authors.is_empty()).then_some(self.authors),
        }
    }
}

/// Last whitespace-separated token of a display name.
pub fn surname(name: &str) -> String {
    name.split_whitespace().last().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surname_is_last_token() {
        assert_eq!(surname("Ashish Vaswani"), "Vaswani");
        assert_eq!(surname("  Smith "), "Smith");
        assert_eq!(surname(""), "");
    }

    #[test]
    fn keyed_entry_keeps_missing_fields_missing() {
        let metadata = KeyedEntry {
            title: "Deep learning".to_string(),
            author_surname: "Smith".to_string(),
            year: "2019".to_string(),
            ..Default::default()
        }
        .into_metadata();
        assert_eq!(metadata.title.as_deref(), Some("Deep learning"));
        assert!(metadata.abstract_text.is_none());
        assert!(metadata.authors.is_none());
    }
}
