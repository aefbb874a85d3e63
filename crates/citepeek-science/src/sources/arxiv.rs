use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::debug;

use crate::config::{ResolverConfig, RetryConfig};
use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;
use crate::identifiers::ArxivId;
use crate::sources::{DirectIdSource, KeyedEntry, KeyedSearchSource, surname};
use crate::types::{PartialMetadata, RecordDate};

const NAME: &str = "arxiv";

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published: String,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    #[serde(default)]
    name: String,
}

/// One paper from an arXiv Atom feed, text cleaned.
#[derive(Debug, Clone, PartialEq)]
pub struct ArxivEntry {
    pub arxiv_id: ArxivId,
    pub abs_url: String,
    pub title: String,
    pub summary: String,
    pub published: String,
    pub authors: Vec<String>,
}

impl ArxivEntry {
    pub fn into_metadata(self) -> PartialMetadata {
        PartialMetadata {
            link: Some(self.abs_url),
            title: non_empty(self.title),
            abstract_text: non_empty(self.summary),
            date: non_empty(self.published).map(RecordDate::Text),
            authors: (!self.authors.is_empty()).then_some(self.authors),
        }
    }

    fn into_keyed(self) -> KeyedEntry {
        KeyedEntry {
            title: self.title,
            author_surname: self.authors.first().map(|name| surname(name)).unwrap_or_default(),
            year: self.published.clone(),
            link: Some(self.abs_url),
            abstract_text: non_empty(self.summary),
            date: non_empty(self.published).map(RecordDate::Text),
            authors: self.authors,
        }
    }
}

/// Parses an Atom response. Entries without a real arXiv id (the API reports
/// errors as a pseudo-entry) are dropped.
pub fn parse_atom_response(xml: &str) -> Result<Vec<ArxivEntry>> {
    let feed: AtomFeed =
        from_str(xml).map_err(|e| ScienceError::Parse(format!("invalid atom xml: {e}")))?;

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let arxiv_id = ArxivId::parse(entry.id.trim())
                .map_err(|_| debug!(id = %entry.id, "skipping atom entry without arXiv id"))
                .ok()?;
            Some(ArxivEntry {
                abs_url: normalize_arxiv_url(entry.id.trim()),
                arxiv_id,
                title: clean_text(&entry.title),
                summary: clean_text(&entry.summary),
                published: entry.published.trim().to_string(),
                authors: entry
                    .authors
                    .iter()
                    .map(|author| clean_text(&author.name))
                    .filter(|name| !name.is_empty())
                    .collect(),
            })
        })
        .collect())
}

pub struct ArxivSource {
    client: RateLimitedClient,
    base_url: String,
}

impl ArxivSource {
    pub fn new(config: &ResolverConfig) -> Self {
        Self::with_params(
            &config.sources.arxiv_url,
            config.retry.clone(),
            &config.sources.user_agent,
        )
    }

    pub fn with_params(base_url: &str, policy: RetryConfig, user_agent: &str) -> Self {
        Self {
            client: RateLimitedClient::new(policy, user_agent),
            base_url: base_url.to_string(),
        }
    }

    fn url_with(&self, query: &str) -> String {
        if self.base_url.contains('?') {
            format!("{}&{query}", self.base_url)
        } else {
            format!("{}?{query}", self.base_url)
        }
    }

    pub async fn fetch_entry(&self, id: &ArxivId) -> Result<Option<ArxivEntry>> {
        let url = self.url_with(&format!("id_list={}", id.versioned()));
        let xml = self.client.get(&url).await?;
        Ok(parse_atom_response(&xml)?.into_iter().next())
    }

    pub async fn search(
        &self,
        title: &str,
        author: &str,
        max_results: u32,
    ) -> Result<Vec<ArxivEntry>> {
        let query = format!(
            "search_query=ti:{}+AND+au:{}&max_results={max_results}",
            urlencoding::encode(title),
            urlencoding::encode(author)
        );
        let xml = self.client.get(&self.url_with(&query)).await?;
        parse_atom_response(&xml)
    }
}

#[async_trait]
impl DirectIdSource for ArxivSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn by_identifier(&self, id: &ArxivId) -> Result<Option<PartialMetadata>> {
        Ok(self.fetch_entry(id).await?.map(ArxivEntry::into_metadata))
    }
}

#[async_trait]
impl KeyedSearchSource for ArxivSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn search_by_title_author(
        &self,
        title_prefix: &str,
        author: &str,
        limit: u32,
    ) -> Result<Vec<KeyedEntry>> {
        let entries = self.search(title_prefix, author, limit).await?;
        Ok(entries.into_iter().map(ArxivEntry::into_keyed).collect())
    }
}

fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

fn normalize_arxiv_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("http://arxiv.org/") {
        return format!("https://arxiv.org/{rest}");
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const BERT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: id_list=1810.04805</title>
  <entry>
    <id>http://arxiv.org/abs/1810.04805v2</id>
    <published>2018-10-11T00:50:01Z</published>
    <updated>2019-05-24T20:37:26Z</updated>
    <title>BERT: Pre-training of Deep Bidirectional Transformers for
      Language Understanding</title>
    <summary>  We introduce a new language representation model called BERT.
    </summary>
    <author><name>Jacob Devlin</name></author>
    <author><name>Ming-Wei Chang</name></author>
    <author><name>Kenton Lee</name></author>
    <arxiv:primary_category term="cs.CL"/>
    <link href="http://arxiv.org/abs/1810.04805v2" rel="alternate" type="text/html"/>
  </entry>
</feed>
"#;

    const ERROR_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_1909.1</id>
    <title>Error</title>
    <summary>incorrect id format for 1909.1</summary>
  </entry>
</feed>
"#;

    fn source(server: &Server) -> ArxivSource {
        ArxivSource::with_params(
            &format!("{}/query", server.url()),
            RetryConfig {
                min_interval_ms: 0,
                base_delay_ms: 1,
                ..Default::default()
            },
            "citepeek-test",
        )
    }

    #[test]
    fn feed_entry_text_is_cleaned() {
        let entries = parse_atom_response(BERT_XML).unwrap();
        assert_eq!(entries.len(), 1);

        let bert = &entries[0];
        assert_eq!(bert.arxiv_id.id, "1810.04805");
        assert_eq!(bert.abs_url, "https://arxiv.org/abs/1810.04805v2");
        assert_eq!(
            bert.title,
            "BERT: Pre-training of Deep Bidirectional Transformers for Language Understanding"
        );
        assert_eq!(bert.summary, "We introduce a new language representation model called BERT.");
        assert_eq!(bert.published, "2018-10-11T00:50:01Z");
        assert_eq!(bert.authors, vec!["Jacob Devlin", "Ming-Wei Chang", "Kenton Lee"]);
    }

    #[test]
    fn error_pseudo_entry_is_dropped() {
        assert!(parse_atom_response(ERROR_XML).unwrap().is_empty());
    }

    #[test]
    fn keyed_entry_uses_first_author_surname() {
        let entry = parse_atom_response(BERT_XML).unwrap().remove(0).into_keyed();
        assert_eq!(entry.author_surname, "Devlin");
        assert!(entry.year.contains("2018"));
    }

    #[tokio::test]
    async fn by_identifier_queries_id_list() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/query")
            .match_query(Matcher::UrlEncoded("id_list".into(), "1810.04805".into()))
            .with_status(200)
            .with_body(BERT_XML)
            .create_async()
            .await;

        let id = ArxivId::parse("arXiv:1810.04805").unwrap();
        let metadata = source(&server).by_identifier(&id).await.unwrap().unwrap();

        mock.assert_async().await;
        assert_eq!(metadata.link.as_deref(), Some("https://arxiv.org/abs/1810.04805v2"));
        assert_eq!(
            metadata.date,
            Some(RecordDate::Text("2018-10-11T00:50:01Z".to_string()))
        );
    }

    #[tokio::test]
    async fn keyed_search_sends_title_and_author_terms() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search_query".into(), "ti:bert AND au:devlin".into()),
                Matcher::UrlEncoded("max_results".into(), "50".into()),
            ]))
            .with_status(200)
            .with_body(BERT_XML)
            .create_async()
            .await;

        let entries = source(&server)
            .search_by_title_author("bert", "devlin", 50)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].author_surname, "Devlin");
    }
}
