use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::config::{ResolverConfig, RetryConfig};
use crate::error::Result;
use crate::http::RateLimitedClient;
use crate::sources::CitationTextSource;
use crate::types::{PartialMetadata, RecordDate};

static MARKUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid markup regex"));

pub struct CrossRefSource {
    client: RateLimitedClient,
    base_url: String,
}

impl CrossRefSource {
    pub fn new(config: &ResolverConfig) -> Self {
        Self::with_params(
            &config.sources.crossref_url,
            config.retry.clone(),
            &config.sources.user_agent,
            config.sources.polite_email.clone(),
        )
    }

    /// With an email the requests go to CrossRef's polite pool.
    pub fn with_params(
        base_url: &str,
        policy: RetryConfig,
        user_agent: &str,
        polite_email: Option<String>,
    ) -> Self {
        let user_agent = match polite_email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            Some(email) => format!("{user_agent} (mailto:{email})"),
            None => user_agent.to_string(),
        };

        Self {
            client: RateLimitedClient::new(policy, &user_agent),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Top hit for a bibliographic query, unscored.
    pub async fn query_bibliographic(&self, reference: &str) -> Result<Option<PartialMetadata>> {
        let url = format!(
            "{}/works?query.bibliographic={}&rows=1",
            self.base_url,
            urlencoding::encode(reference)
        );
        let val: Value = self.client.get_json(&url).await?;

        Ok(val["message"]["items"]
            .as_array()
            .and_then(|items| items.first())
            .map(work_to_metadata))
    }
}

#[async_trait]
impl CitationTextSource for CrossRefSource {
    fn name(&self) -> &str {
        "crossref"
    }

    async fn search_by_citation_text(&self, text: &str) -> Result<Option<PartialMetadata>> {
        self.query_bibliographic(text).await
    }
}

fn work_to_metadata(item: &Value) -> PartialMetadata {
    let authors = parse_authors(item);
    PartialMetadata {
        link: item["URL"].as_str().map(ToOwned::to_owned),
        title: item["title"][0].as_str().map(ToOwned::to_owned),
        abstract_text: item["abstract"].as_str().map(strip_markup),
        date: parse_date(item),
        authors: (!authors.is_empty()).then_some(authors),
    }
}

/// `{"published": {"date-parts": [[2015, 2, 26]]}}`; a lone year stays a year.
fn parse_date(item: &Value) -> Option<RecordDate> {
    let parts = ["published", "published-print", "published-online", "issued"]
        .iter()
        .find_map(|key| item[*key]["date-parts"][0].as_array())?;
    let numbers: Vec<i64> = parts.iter().map_while(Value::as_i64).collect();

    match numbers.as_slice() {
        [] => None,
        [year] => Some(RecordDate::Year(*year as i32)),
        [year, month] => Some(RecordDate::Text(format!("{year:04}-{month:02}"))),
        [year, month, day, ..] => Some(RecordDate::Text(format!("{year:04}-{month:02}-{day:02}"))),
    }
}

fn parse_authors(item: &Value) -> Vec<String> {
    item["author"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|v| match (v["given"].as_str(), v["family"].as_str()) {
                    (Some(g), Some(f)) => format!("{g} {f}"),
                    (None, Some(f)) => f.to_string(),
                    (Some(g), None) => g.to_string(),
                    (None, None) => v["name"].as_str().unwrap_or_default().to_string(),
                })
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

// CrossRef abstracts are JATS fragments.
fn strip_markup(text: &str) -> String {
    MARKUP_RE
        .replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn source(server: &Server, email: Option<&str>) -> CrossRefSource {
        CrossRefSource::with_params(
            &server.url(),
            RetryConfig {
                min_interval_ms: 0,
                base_delay_ms: 1,
                ..Default::default()
            },
            "citepeek-test",
            email.map(ToOwned::to_owned),
        )
    }

    #[tokio::test]
    async fn bibliographic_query_takes_top_item() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query.bibliographic".into(), "Mnih 2015".into()),
                Matcher::UrlEncoded("rows".into(), "1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "status": "ok",
                    "message": { "items": [{
                        "DOI": "10.1038/nature14539",
                        "URL": "http://dx.doi.org/10.1038/nature14539",
                        "title": ["Human-level control through deep reinforcement learning"],
                        "author": [
                            {"given": "Volodymyr", "family": "Mnih"},
                            {"given": "Koray", "family": "Kavukcuoglu"}
                        ],
                        "published": {"date-parts": [[2015, 2, 26]]},
                        "abstract": "<jats:p>The theory of reinforcement learning\n provides</jats:p>"
                    }]}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let metadata = source(&server, None)
            .search_by_citation_text("Mnih 2015")
            .await
            .unwrap()
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            metadata.title.as_deref(),
            Some("Human-level control through deep reinforcement learning")
        );
        assert_eq!(metadata.link.as_deref(), Some("http://dx.doi.org/10.1038/nature14539"));
        assert_eq!(metadata.date, Some(RecordDate::Text("2015-02-26".to_string())));
        assert_eq!(
            metadata.authors,
            Some(vec!["Volodymyr Mnih".to_string(), "Koray Kavukcuoglu".to_string()])
        );
        assert_eq!(
            metadata.abstract_text.as_deref(),
            Some("The theory of reinforcement learning provides")
        );
    }

    #[tokio::test]
    async fn empty_item_list_is_none() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/works")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"ok","message":{"items":[]}}"#)
            .create_async()
            .await;

        let result = source(&server, None)
            .search_by_citation_text("nothing like this")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn polite_email_goes_into_user_agent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::Any)
            .match_header("user-agent", "citepeek-test (mailto:me@example.org)")
            .with_status(200)
            .with_body(r#"{"message":{"items":[]}}"#)
            .create_async()
            .await;

        source(&server, Some("me@example.org"))
            .search_by_citation_text("anything")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn year_only_date_parts_stay_a_year() {
        let item = json!({ "issued": {"date-parts": [[2019]]} });
        assert_eq!(parse_date(&item), Some(RecordDate::Year(2019)));
        assert_eq!(parse_date(&json!({})), None);
    }
}
