use chrono::{DateTime, NaiveDate};

use crate::types::{DatePreposition, MetadataRecord, PartialMetadata, RecordDate};

pub const NO_LINK: &str = "#";
pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const NO_ABSTRACT: &str = "No abstract found";
pub const NO_AUTHORS: &str = "No authors found";
pub const NO_DATE: &str = "No date found";

/// Fills every gap with its sentinel so presentation never sees a missing field.
pub fn normalize(partial: PartialMetadata) -> MetadataRecord {
    let (date, date_preposition) = format_date(partial.date);

    let authors: Vec<String> = partial
        .authors
        .unwrap_or_default()
        .iter()
        .filter_map(|name| present(name))
        .collect();

    MetadataRecord {
        link: partial
            .link
            .as_deref()
            .and_then(present)
            .unwrap_or_else(|| NO_LINK.to_string()),
        full_title: partial
            .title
            .as_deref()
            .and_then(present)
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        abstract_text: partial
            .abstract_text
            .as_deref()
            .and_then(present)
            .unwrap_or_else(|| NO_ABSTRACT.to_string()),
        date,
        date_preposition,
        authors: if authors.is_empty() {
            vec![NO_AUTHORS.to_string()]
        } else {
            authors
        },
    }
}

/// Whitespace-collapsed value, or `None` for blank text and the literal `null`.
fn present(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || collapsed.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(collapsed)
    }
}

/// Bare years read "in 2019"; full dates read "on Jun 12, 2017"; a year and
/// month read "in Jun 2017". Anything unparseable passes through with "on".
pub fn format_date(date: Option<RecordDate>) -> (String, DatePreposition) {
    let text = match date {
        Some(RecordDate::Year(year)) => return (year.to_string(), DatePreposition::In),
        Some(RecordDate::Text(text)) => present(&text),
        None => None,
    };
    let Some(text) = text else {
        return (NO_DATE.to_string(), DatePreposition::On);
    };

    if text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()) {
        return (text, DatePreposition::In);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return (dt.format("%b %-d, %Y").to_string(), DatePreposition::On);
    }
    if let Ok(day) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        return (day.format("%b %-d, %Y").to_string(), DatePreposition::On);
    }
    if let Ok(month) = NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d") {
        return (month.format("%b %Y").to_string(), DatePreposition::In);
    }
    (text, DatePreposition::On)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_metadata_gets_every_sentinel() {
        let record = normalize(PartialMetadata::default());
        assert_eq!(record.link, "#");
        assert_eq!(record.full_title, "Unknown Title");
        assert_eq!(record.abstract_text, "No abstract found");
        assert_eq!(record.authors, vec!["No authors found".to_string()]);
        assert_eq!(record.date, "No date found");
        assert_eq!(record.date_preposition, DatePreposition::On);
    }

    #[test]
    fn literal_null_and_blank_fields_are_missing() {
        let record = normalize(PartialMetadata {
            link: Some("null".to_string()),
            title: Some("  ".to_string()),
            abstract_text: Some("null".to_string()),
            authors: Some(vec![" ".to_string(), " Jane   Doe ".to_string()]),
            date: Some(RecordDate::Text("null".to_string())),
        });
        assert_eq!(record.link, "#");
        assert_eq!(record.full_title, "Unknown Title");
        assert_eq!(record.abstract_text, "No abstract found");
        assert_eq!(record.authors, vec!["Jane Doe".to_string()]);
        assert_eq!(record.date, "No date found");
    }

    #[test]
    fn years_use_in_and_full_dates_use_on() {
        assert_eq!(
            format_date(Some(RecordDate::Year(2019))),
            ("2019".to_string(), DatePreposition::In)
        );
        assert_eq!(
            format_date(Some(RecordDate::Text("2019".to_string()))),
            ("2019".to_string(), DatePreposition::In)
        );
        assert_eq!(
            format_date(Some(RecordDate::Text("2017-06-12T17:57:40Z".to_string()))),
            ("Jun 12, 2017".to_string(), DatePreposition::On)
        );
        assert_eq!(
            format_date(Some(RecordDate::Text("2015-02-26".to_string()))),
            ("Feb 26, 2015".to_string(), DatePreposition::On)
        );
        assert_eq!(
            format_date(Some(RecordDate::Text("2015-02".to_string()))),
            ("Feb 2015".to_string(), DatePreposition::In)
        );
    }

    #[test]
    fn unparseable_date_passes_through() {
        assert_eq!(
            format_date(Some(RecordDate::Text("Spring 2018".to_string()))),
            ("Spring 2018".to_string(), DatePreposition::On)
        );
    }

    #[test]
    fn published_line_reads_naturally() {
        let record = normalize(PartialMetadata {
            date: Some(RecordDate::Year(2019)),
            ..Default::default()
        });
        assert_eq!(record.published_line(), "Published in 2019.");
    }
}
