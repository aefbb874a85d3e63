use serde::{Deserialize, Serialize};

use crate::identifiers::BibKey;

/// Link targets naming document structure rather than a bibliography entry.
const STRUCTURAL_TARGETS: &[&str] = &[
    "section",
    "subsection",
    "chapter",
    "appendix",
    "figure",
    "table",
    "equation",
    "algorithm",
    "footnote",
    "page",
];

/// A positioned run of text on a rendered page. `y` grows upwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
        }
    }
}

/// Where an internal link lands: 1-based page number and coordinates on it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub page: u32,
    pub x: f64,
    pub y: f64,
}

/// The clicked citation link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceAnchor {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
}

impl ReferenceAnchor {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            destination: None,
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    /// The internal link fragment: everything after `#`, or the whole href.
    pub fn target(&self) -> &str {
        match self.href.split_once('#') {
            Some((_, fragment)) => fragment,
            None => self.href.as_str(),
        }
    }

    /// A compact key always counts, even when its surname reads like `page` or `table`.
    pub fn is_citation_link(&self) -> bool {
        let target = self.target().to_ascii_lowercase();
        if target.trim().is_empty() {
            return self.destination.is_some();
        }
        if BibKey::from_link_target(&target).is_some() {
            return true;
        }
        let kind = target
            .split(|c: char| !c.is_ascii_alphabetic())
            .find(|word| !word.is_empty())
            .unwrap_or_default();
        !STRUCTURAL_TARGETS.contains(&kind)
    }
}

/// A publication date as a source reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordDate {
    Year(i32),
    Text(String),
}

/// What a source returned; any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialMetadata {
    pub link: Option<String>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub date: Option<RecordDate>,
    pub authors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePreposition {
    In,
    On,
}

impl DatePreposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::On => "on",
        }
    }
}

/// Fully populated record handed to presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub link: String,
    pub full_title: String,
    pub abstract_text: String,
    pub date: String,
    pub date_preposition: DatePreposition,
    pub authors: Vec<String>,
}

impl MetadataRecord {
    /// `Published in 2019.` / `Published on Jun 12, 2017.`
    pub fn published_line(&self) -> String {
        format!("Published {} {}.", self.date_preposition.as_str(), self.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_fragment_after_hash() {
        let anchor = ReferenceAnchor::new("paper.pdf#cite.smith2019deep");
        assert_eq!(anchor.target(), "cite.smith2019deep");
        assert_eq!(ReferenceAnchor::new("cite.x").target(), "cite.x");
    }

    #[test]
    fn structural_links_are_not_citations() {
        assert!(!ReferenceAnchor::new("#subsection.3.2").is_citation_link());
        assert!(!ReferenceAnchor::new("#figure.caption.4").is_citation_link());
        assert!(!ReferenceAnchor::new("#page=12").is_citation_link());
        assert!(ReferenceAnchor::new("#cite.vaswani2017attention").is_citation_link());
        assert!(ReferenceAnchor::new("#bib.bib12").is_citation_link());
        assert!(ReferenceAnchor::new("#cite.brin1998page").is_citation_link());
    }

    #[test]
    fn compact_keys_with_structural_surnames_are_citations() {
        assert!(ReferenceAnchor::new("#page1999pagerank").is_citation_link());
        assert!(ReferenceAnchor::new("paper.pdf#table2004learning").is_citation_link());
        assert!(!ReferenceAnchor::new("#table.2").is_citation_link());
    }

    #[test]
    fn empty_target_needs_a_destination() {
        assert!(!ReferenceAnchor::new("#").is_citation_link());
        let anchor = ReferenceAnchor::new("#").with_destination(Destination {
            page: 3,
            x: 10.0,
            y: 500.0,
        });
        assert!(anchor.is_citation_link());
    }

    #[test]
    fn record_date_deserializes_numbers_and_strings() {
        let year: RecordDate = serde_json::from_str("2019").unwrap();
        let text: RecordDate = serde_json::from_str("\"2017-06-12\"").unwrap();
        assert_eq!(year, RecordDate::Year(2019));
        assert_eq!(text, RecordDate::Text("2017-06-12".to_string()));
    }
}
