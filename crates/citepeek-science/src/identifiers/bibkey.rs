use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};

/// `smith2019deep`: surname, four-digit year, first title word. No delimiters.
static COMPACT_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-zA-Z]+)(\d{4})([a-zA-Z]+)$").expect("valid bibkey regex"));

/// Prefixes LaTeX toolchains put in front of citation keys in link targets.
const KEY_PREFIXES: &[&str] = &["cite.", "bib.", "ref.", "b."];

/// Author/year/title-prefix shorthand carried by some citation links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibKey {
    pub author: String,
    pub year: String,
    pub title_prefix: String,
}

impl BibKey {
    /// Parses a bare compact key. Parts are lower-cased.
    pub fn parse(key: &str) -> Result<Self> {
        let key = key.trim();
        let caps = COMPACT_KEY
            .captures(key)
            .ok_or_else(|| ScienceError::InvalidBibKey(key.to_string()))?;
        let part = |i: usize| {
            caps.get(i)
                .map(|m| m.as_str().to_ascii_lowercase())
                .ok_or_else(|| ScienceError::InvalidBibKey(key.to_string()))
        };

        Ok(Self {
            author: part(1)?,
            year: part(2)?,
            title_prefix: part(3)?,
        })
    }

    /// Parses an anchor target such as `cite.smith2019deep`.
    pub fn from_link_target(target: &str) -> Option<Self> {
        let target = target.trim();
        let lowered = target.to_ascii_lowercase();
        let key = KEY_PREFIXES
            .iter()
            .find(|prefix| lowered.starts_with(*prefix))
            .map(|prefix| &target[prefix.len()..])
            .unwrap_or(target);
        Self::parse(key).ok()
    }

    /// Does a search hit agree with this key on year, first-author surname and title start?
    pub fn matches(&self, year: &str, author_surname: &str, title: &str) -> bool {
        year.contains(&self.year)
            && author_surname.to_lowercase().ends_with(&self.author)
            && title.trim().to_lowercase().starts_with(&self.title_prefix)
    }
}

impl fmt::Display for BibKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.author, self.year, self.title_prefix)
    }
}
