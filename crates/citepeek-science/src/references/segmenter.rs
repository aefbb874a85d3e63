use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::SegmenterConfig;
use crate::types::TextFragment;

static BRACKET_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("valid bracket marker regex"));

static LEADING_BRACKET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[\d+\]").expect("valid leading bracket regex"));

// (Vaswani, 2017) / (Vaswani et al., 2017) / (Vaswani et al.)
static AUTHOR_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(([^)]+?)(?:,\s*\d{4}|\s+et\s+al\.?(?:,\s*\d{4})?)\)")
        .expect("valid author-year regex")
});

// "Ashish Vaswani, Noam Shazeer, and Niki Parmar."
static AUTHOR_LIST_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z][\w.'\-]*(?:\s+[A-Z][\w.'\-]*)*(?:,\s*[A-Z][\w.'\-]*(?:\s+[A-Z][\w.'\-]*)*)*,?\s+and\s+[A-Z][\w.'\-]*(?:\s+[A-Z][\w.'\-]*)*\.")
        .expect("valid author list regex")
});

// "A. Vaswani et al." / "J. K. Smith et al."
static ET_AL_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Z]\.\s*)+[A-Z][a-z]+(?:[\s,]+(?:[A-Z]\.\s*)*[A-Z][a-z]+)*,?\s+et\s+al\.")
        .expect("valid et-al regex")
});

// "12. Vaswani"
static ORDINAL_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}\.\s+[A-Z][a-z]+").expect("valid ordinal regex"));

/// A row of fragments sharing (nearly) the same baseline, left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub y: f64,
    pub fragments: Vec<TextFragment>,
}

impl Line {
    pub fn text(&self) -> String {
        join_collapsed(self.fragments.iter().map(|f| f.text.as_str()))
    }
}

/// Isolates one bibliography entry from windowed page fragments.
pub struct CitationSegmenter {
    config: SegmenterConfig,
}

impl CitationSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Groups fragments into lines: top to bottom, each line left to right.
    /// A fragment joins the current line when its y is within the tolerance
    /// of the line's first fragment.
    pub fn lines(&self, fragments: &[TextFragment]) -> Vec<Line> {
        let mut sorted = fragments.to_vec();
        sorted.sort_by(|a, b| b.y.total_cmp(&a.y));

        let mut lines: Vec<Line> = Vec::new();
        for fragment in sorted {
            match lines.last_mut() {
                Some(line) if (line.y - fragment.y).abs() < self.config.line_tolerance => {
                    line.fragments.push(fragment);
                }
                _ => lines.push(Line {
                    y: fragment.y,
                    fragments: vec![fragment],
                }),
            }
        }
        for line in &mut lines {
            line.fragments.sort_by(|a, b| a.x.total_cmp(&b.x));
        }
        lines
    }

    /// The citation text for the entry nearest `target_y`, or `None` when the
    /// window is empty or nothing coherent could be isolated.
    pub fn segment(&self, fragments: &[TextFragment], target_y: Option<f64>) -> Option<String> {
        let lines = self.lines(fragments);
        let line_texts: Vec<String> = lines.iter().map(Line::text).collect();
        let blob = join_collapsed(line_texts.iter().map(String::as_str));
        if blob.is_empty() {
            return None;
        }

        if let Some(citation) = self.bracketed(&lines, &blob, target_y) {
            debug!(strategy = "bracket", "isolated citation");
            return Some(citation);
        }
        if let Some(citation) = self.author_year(&lines, &blob) {
            debug!(strategy = "author_year", "isolated citation");
            return Some(citation);
        }
        if let Some(citation) = self.heuristic_entry(&lines, target_y) {
            debug!(strategy = "heuristic_entry", "isolated citation");
            return Some(citation);
        }
        if self.config.fallback_to_window_text {
            debug!(strategy = "window_text", "no entry boundary found, using window text");
            return Some(blob);
        }
        None
    }

    fn bracketed(&self, lines: &[Line], blob: &str, target_y: Option<f64>) -> Option<String> {
        let markers: Vec<(usize, String)> = lines
            .iter()
            .enumerate()
            .flat_map(|(idx, line)| {
                let text = line.text();
                BRACKET_MARKER_RE
                    .captures_iter(&text)
                    .filter_map(|caps| caps.get(1).map(|m| (idx, m.as_str().to_string())))
                    .collect::<Vec<_>>()
            })
            .collect();

        let (line_idx, number) = match target_y {
            Some(y0) => markers
                .iter()
                .min_by(|(a, _), (b, _)| {
                    (lines[*a].y - y0).abs().total_cmp(&(lines[*b].y - y0).abs())
                })
                .cloned(),
            None => markers.first().cloned(),
        }?;

        let marker = format!("[{number}]");
        if let Some(start) = blob.find(&marker) {
            let rest = &blob[start + marker.len()..];
            let end = rest.find('[').unwrap_or(rest.len());
            let run = rest[..end].trim();
            if !run.is_empty() {
                return Some(run.to_string());
            }
        }

        // Marker stands alone; walk the fragments that follow it.
        let ordered: Vec<&TextFragment> = lines.iter().flat_map(|line| &line.fragments).collect();
        let marker_y = lines[line_idx].y;
        let start = ordered.iter().position(|f| f.text.contains(&marker))?;
        let collected = ordered[start + 1..]
            .iter()
            .take_while(|f| {
                !LEADING_BRACKET_RE.is_match(&f.text)
                    && (f.y - marker_y).abs() < self.config.bracket_follow_gap
            })
            .map(|f| f.text.as_str());
        let citation = join_collapsed(collected);
        (!citation.is_empty()).then_some(citation)
    }

    fn author_year(&self, lines: &[Line], blob: &str) -> Option<String> {
        let caps = AUTHOR_YEAR_RE.captures(blob)?;
        let in_text = caps.get(0)?.as_str();
        let author = caps.get(1)?.as_str().split(',').next()?.trim();
        if author.is_empty() {
            return None;
        }

        // The entry line names the author outside of the in-text citation itself.
        let start = lines.iter().position(|line| {
            let text = line.text();
            text.contains(author) && !text.contains(in_text)
        })?;
        let start_y = lines[start].y;
        let collected: Vec<String> = lines[start..]
            .iter()
            .take_while(|line| (line.y - start_y).abs() < self.config.author_year_follow_gap)
            .map(Line::text)
            .collect();
        let citation = join_collapsed(collected.iter().map(String::as_str));
        (!citation.is_empty()).then_some(citation)
    }

    fn heuristic_entry(&self, lines: &[Line], target_y: Option<f64>) -> Option<String> {
        let mut entries: Vec<(f64, Vec<String>)> = Vec::new();
        for line in lines {
            let text = line.text();
            if starts_entry(&text) {
                entries.push((line.y, vec![text]));
                continue;
            }
            match entries.last_mut() {
                Some((start_y, parts)) if (*start_y - line.y).abs() <= self.config.entry_gap => {
                    parts.push(text);
                }
                // Lines before the first entry start, or past the gap, belong elsewhere.
                _ => {}
            }
        }

        let chosen = match target_y {
            Some(y0) => entries
                .iter()
                .min_by(|(a, _), (b, _)| (a - y0).abs().total_cmp(&(b - y0).abs())),
            None => entries.first(),
        }?;
        let citation = join_collapsed(chosen.1.iter().map(String::as_str));
        (!citation.is_empty()).then_some(citation)
    }
}

impl Default for CitationSegmenter {
    fn default() -> Self {
        Self::new(SegmenterConfig::default())
    }
}

/// Does this line look like the first line of a bibliography entry?
pub fn starts_entry(line: &str) -> bool {
    let line = line.trim_start();
    AUTHOR_LIST_START_RE.is_match(line)
        || ET_AL_START_RE.is_match(line)
        || ORDINAL_START_RE.is_match(line)
}

fn join_collapsed<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
