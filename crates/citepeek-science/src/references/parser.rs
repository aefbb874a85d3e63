use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ParserConfig;
use crate::identifiers::{ArxivId, BibKey, find_arxiv_id};
use crate::types::ReferenceAnchor;

/// One author name: optional initials / given names, then a capitalised surname.
const AUTHOR: &str = r"(?:[A-Z][a-z]*\.?\s+)*[A-Z][a-z]+";

/// Free-text title patterns, most specific first. Each captures the title in group 1.
static DEFAULT_PATTERNS: Lazy<Vec<TitlePattern>> = Lazy::new(|| {
    let authors = format!(r"{AUTHOR}(?:\s*,\s*{AUTHOR})*");
    let authors_et_al = format!(r"{authors}(?:\s*,\s*et\s+al\.)?");
    let after = |lead: &str, tail: &str| format!(r"(?:{lead}\s*\.\s*)([^.]+?){tail}");

    vec![
        TitlePattern::new(
            "sentence_before_venue",
            r"(?:^|\.\s+)([^.]+?)\.\s+(?:(?:In|arXiv|URL|Advances|Nature|volume)\b|pp\.)",
        ),
        TitlePattern::new("sentence_before_year", r"(?:^|\.\s+)([^.]+?)\.\s+(?:\d{4}|\(\d{4}\))"),
        TitlePattern::new("et_al_before_arxiv", &after(&authors_et_al, r"[.,]\s+arXiv")),
        TitlePattern::new("et_al_before_in", &after(&authors_et_al, r"[.,]\s+In\b")),
        TitlePattern::new(
            "et_al_before_proceedings",
            &after(&authors_et_al, r"[.,]\s+Proceedings"),
        ),
        TitlePattern::new("authors_before_arxiv", &after(&authors, r"[.,]\s+arXiv")),
        TitlePattern::new("authors_before_in_venue", &after(&authors, r"[.,]\s+In\s+[A-Z]")),
        TitlePattern::new("authors_before_proceedings", &after(&authors, r"[.,]\s+Proceedings")),
        TitlePattern::new("authors_before_capitalised", &after(&authors, r"[.,]\s+[A-Z][a-z]+")),
        TitlePattern::new("authors_before_period", &after(&authors, r"\.")),
        TitlePattern::new(
            "author_list_with_and",
            &after(&format!(r"{authors}\s*(?:,|,\s+and)\s+{AUTHOR}"), r"\."),
        ),
        TitlePattern::new(
            "any_sentence",
            r"(?:[A-Za-z]+(?:\s+[A-Za-z]+)*(?:,\s*[A-Za-z]+(?:\s+[A-Za-z]+)*)*(?:\s*,\s*and\s+[A-Za-z]+(?:\s+[A-Za-z]+)*)?)\s*\.\s*([^.]+?)(?:,|\.|$)",
        ),
    ]
});

/// A regex plus which capture group holds the title.
#[derive(Debug, Clone)]
pub struct TitlePattern {
    pub name: &'static str,
    regex: Regex,
    group: usize,
}

impl TitlePattern {
    /// Panics on an invalid pattern; patterns are compile-time literals.
    pub fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("valid title pattern"),
            group: 1,
        }
    }

    pub fn extract<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(self.group))
            .map(|m| m.as_str().trim())
    }
}

/// Ordered pattern list with the minimum title length.
#[derive(Debug, Clone)]
pub struct TitleBattery {
    patterns: Vec<TitlePattern>,
    min_len: usize,
}

impl TitleBattery {
    pub fn new(patterns: Vec<TitlePattern>, min_len: usize) -> Self {
        Self { patterns, min_len }
    }

    pub fn with_min_len(min_len: usize) -> Self {
        Self::new(DEFAULT_PATTERNS.clone(), min_len)
    }

    /// Lazily yields validated, de-duplicated titles in pattern order.
    pub fn candidates<'a>(&'a self, citation: &'a str) -> CandidateTitles<'a> {
        CandidateTitles {
            battery: self,
            citation,
            next_pattern: 0,
            seen: HashSet::new(),
        }
    }
}

impl Default for TitleBattery {
    fn default() -> Self {
        Self::with_min_len(ParserConfig::default().min_title_len)
    }
}

pub struct CandidateTitles<'a> {
    battery: &'a TitleBattery,
    citation: &'a str,
    next_pattern: usize,
    seen: HashSet<String>,
}

impl Iterator for CandidateTitles<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while let Some(pattern) = self.battery.patterns.get(self.next_pattern) {
            self.next_pattern += 1;
            let Some(title) = pattern.extract(self.citation) else {
                continue;
            };
            if title.chars().count() < self.battery.min_len {
                debug!(pattern = pattern.name, title, "title too short, trying next pattern");
                continue;
            }
            if self.seen.insert(title.to_string()) {
                debug!(pattern = pattern.name, title, "candidate title");
                return Some(title.to_string());
            }
        }
        None
    }
}

/// What the parser could pull out of an anchor or a citation string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identifiers {
    /// Compact key from the link itself; no page text needed.
    Keyed(BibKey),
    /// An explicit arXiv token in the citation text.
    Arxiv(ArxivId),
    /// Citation text. Candidate titles are drawn from it on demand, see
    /// [`TitleBattery::candidates`].
    FreeText { citation: String },
}

#[derive(Debug, Clone, Default)]
pub struct IdentifierParser {
    battery: Arc<TitleBattery>,
}

impl IdentifierParser {
    pub fn new(config: &ParserConfig) -> Self {
        Self::with_battery(TitleBattery::with_min_len(config.min_title_len))
    }

    pub fn with_battery(battery: TitleBattery) -> Self {
        Self {
            battery: Arc::new(battery),
        }
    }

    /// Shared with the resolver chain, which pulls titles from it stage by stage.
    pub fn battery(&self) -> &Arc<TitleBattery> {
        &self.battery
    }

    pub fn candidates<'a>(&'a self, citation: &'a str) -> CandidateTitles<'a> {
        self.battery.candidates(citation)
    }

    /// The BibKey path: only the anchor's own link target is consulted.
    pub fn parse_anchor(&self, anchor: &ReferenceAnchor) -> Option<Identifiers> {
        BibKey::from_link_target(anchor.target()).map(Identifiers::Keyed)
    }

    /// The free-text path. `None` for blank input.
    pub fn parse_citation(&self, citation: &str) -> Option<Identifiers> {
        let citation = citation.split_whitespace().collect::<Vec<_>>().join(" ");
        if citation.is_empty() {
            return None;
        }

        if let Some(id) = find_arxiv_id(&citation) {
            debug!(arxiv_id = %id.id, "arXiv token found, skipping title patterns");
            return Some(Identifiers::Arxiv(id));
        }

        Some(Identifiers::FreeText { citation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bibkey_anchor_parses_without_text() {
        let parser = IdentifierParser::default();
        let parsed = parser.parse_anchor(&ReferenceAnchor::new("#cite.smith2019deep"));
        assert_eq!(
            parsed,
            Some(Identifiers::Keyed(BibKey {
                author: "smith".to_string(),
                year: "2019".to_string(),
                title_prefix: "deep".to_string(),
            }))
        );
        assert_eq!(parser.parse_anchor(&ReferenceAnchor::new("#bib.bib12")), None);
    }

    #[test]
    fn arxiv_token_bypasses_title_patterns() {
        let parser = IdentifierParser::default();
        let parsed = parser
            .parse_citation("J. Smith. Deep Learning. arXiv:1909.12345, 2019.")
            .unwrap();
        match parsed {
            Identifiers::Arxiv(id) => assert_eq!(id.id, "1909.12345"),
            other => panic!("expected arXiv id, got {other:?}"),
        }
    }

    #[test]
    fn venue_terminated_title_comes_first() {
        let parser = IdentifierParser::default();
        let parsed = parser
            .parse_citation(
                "Ashish Vaswani, Noam Shazeer, Niki Parmar. Attention is all you need. \
                 In Advances in Neural Information Processing Systems, 2017.",
            )
            .unwrap();
        let Identifiers::FreeText { citation } = parsed else {
            panic!("expected free text");
        };
        assert_eq!(
            parser.candidates(&citation).next().as_deref(),
            Some("Attention is all you need")
        );
    }

    #[test]
    fn capitalised_venue_pattern_finds_title() {
        let battery = TitleBattery::default();
        let candidates: Vec<_> = battery
            .candidates("J. Smith. Deep learning for everyone. Journal of Things, 2019.")
            .collect();
        assert!(candidates.contains(&"Deep learning for everyone".to_string()));
    }

    #[test]
    fn short_titles_are_skipped_for_later_patterns() {
        let battery = TitleBattery::new(
            vec![
                TitlePattern::new("short_a", r"^(\w+)"),
                TitlePattern::new("short_b", r"(Nets)"),
                TitlePattern::new("short_c", r"(2017)"),
                TitlePattern::new("quoted", r#""([^"]+)""#),
            ],
            10,
        );
        let candidates: Vec<_> = battery
            .candidates(r#"Vaswani. "Attention Is All You Need". Nets, 2017."#)
            .collect();
        assert_eq!(candidates, vec!["Attention Is All You Need".to_string()]);
    }

    #[test]
    fn duplicate_titles_are_yielded_once() {
        let battery = TitleBattery::new(
            vec![
                TitlePattern::new("first", r"^(Graph networks at scale)"),
                TitlePattern::new("again", r"(Graph networks at scale)"),
            ],
            10,
        );
        let candidates: Vec<_> = battery.candidates("Graph networks at scale.").collect();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn candidate_order_is_stable_across_runs() {
        let parser = IdentifierParser::default();
        let citation = "Alice Jones, Bob Brown, and Carol White. Graph networks at scale. \
                        In Proceedings of ICML, pages 1-9, 2018.";
        let first: Vec<_> = parser.candidates(citation).collect();
        let second: Vec<_> = parser.candidates(citation).collect();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn first_candidate_leaves_later_patterns_unevaluated() {
        let battery = TitleBattery::new(
            vec![
                TitlePattern::new("too_short", r"^(\w+)\."),
                TitlePattern::new("sentence", r"\.\s+([^.]+)\.\s+Nets"),
                TitlePattern::new("venue", r"(Nets, 2017)"),
            ],
            10,
        );
        let mut titles = battery.candidates("Vaswani. Attention Is All You Need. Nets, 2017.");
        assert_eq!(titles.next().as_deref(), Some("Attention Is All You Need"));
        assert_eq!(titles.next_pattern, 2);
        assert_eq!(titles.next().as_deref(), Some("Nets, 2017"));
        assert_eq!(titles.next(), None);
    }

    #[test]
    fn free_text_carries_only_the_normalised_citation() {
        let parsed =
            IdentifierParser::default().parse_citation("A. Author.\n  Some long title. 2001.");
        assert_eq!(
            parsed,
            Some(Identifiers::FreeText {
                citation: "A. Author. Some long title. 2001.".to_string()
            })
        );
    }

    #[test]
    fn blank_citation_is_a_parse_miss() {
        assert_eq!(IdentifierParser::default().parse_citation("   \n "), None);
    }

    #[test]
    fn every_default_pattern_compiles() {
        assert_eq!(DEFAULT_PATTERNS.len(), 12);
    }
}
