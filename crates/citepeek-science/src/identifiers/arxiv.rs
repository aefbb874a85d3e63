use crate::error::{Result, ScienceError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// New format: YYMM.NNNNN or YYMM.NNNN (with optional version)
static NEW_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}\.\d{4,5})(v(\d+))?$").expect("valid arXiv id regex"));

// Old format: category/YYMMNNN
static OLD_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z\-]+(?:\.[A-Z]{2})?/\d{7})(v(\d+))?$")
        .expect("valid legacy arXiv id regex")
});

// An `arXiv:` token embedded in running citation text.
static EMBEDDED_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\barxiv\s*:\s*(\d{4}\.\d{4,5}(?:v\d+)?|[a-z\-]+(?:\.[A-Z]{2})?/\d{7}(?:v\d+)?)")
        .expect("valid embedded arXiv token regex")
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArxivId {
    pub raw: String,
    pub id: String,
    pub version: Option<u8>,
    pub abs_url: String,
}

impl ArxivId {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let stripped = if let Some(s) = input.strip_prefix("https://arxiv.org/abs/") {
            s
        } else if let Some(s) = input.strip_prefix("http://arxiv.org/abs/") {
            s
        } else if let Some(s) = input.strip_prefix("arXiv:") {
            s
        } else if let Some(s) = input.strip_prefix("arxiv:") {
            s
        } else {
            input
        };

        let caps = NEW_FORMAT
            .captures(stripped)
            .or_else(|| OLD_FORMAT.captures(stripped))
            .ok_or_else(|| ScienceError::InvalidArxivId(input.to_string()))?;

        let id = caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ScienceError::InvalidArxivId(input.to_string()))?;
        let version = caps.get(3).and_then(|v| v.as_str().parse::<u8>().ok());

        Ok(Self {
            raw: input.to_string(),
            abs_url: format!("https://arxiv.org/abs/{id}"),
            id,
            version,
        })
    }

    /// Identifier as sent to the arXiv API, version included when known.
    pub fn versioned(&self) -> String {
        match self.version {
            Some(version) => format!("{}v{version}", self.id),
            None => self.id.clone(),
        }
    }
}

/// First `arXiv:`-prefixed identifier in reading order.
pub fn find_arxiv_id(text: &str) -> Option<ArxivId> {
    EMBEDDED_TOKEN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| ArxivId::parse(m.as_str()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_format_bare() {
        let id = ArxivId::parse("2301.04567").unwrap();
        assert_eq!(id.id, "2301.04567");
        assert_eq!(id.version, None);
        assert_eq!(id.abs_url, "https://arxiv.org/abs/2301.04567");
    }

    #[test]
    fn new_format_with_version() {
        let id = ArxivId::parse("arXiv:2301.04567v2").unwrap();
        assert_eq!(id.id, "2301.04567");
        assert_eq!(id.version, Some(2));
        assert_eq!(id.versioned(), "2301.04567v2");
    }

    #[test]
    fn old_format_with_category() {
        let id = ArxivId::parse("hep-th/9901001").unwrap();
        assert_eq!(id.id, "hep-th/9901001");
    }

    #[test]
    fn reject_not_arxiv() {
        assert!(ArxivId::parse("12345").is_err());
        assert!(ArxivId::parse("123.456").is_err());
    }

    #[test]
    fn finds_token_inside_citation() {
        let id = find_arxiv_id("J. Smith. Deep Learning. arXiv:1909.12345, 2019.").unwrap();
        assert_eq!(id.id, "1909.12345");
    }

    #[test]
    fn finds_first_token_in_reading_order() {
        let id = find_arxiv_id("See arXiv: 2005.14165v4 and arXiv:1706.03762.").unwrap();
        assert_eq!(id.id, "2005.14165");
        assert_eq!(id.version, Some(4));
    }

    #[test]
    fn bare_numbers_are_not_tokens() {
        assert!(find_arxiv_id("Nature 521, 1909.12345 (2015)").is_none());
        assert!(find_arxiv_id("preprint arXiv, 2019").is_none());
    }
}
