use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::{ResolverConfig, RetryConfig};
use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;
use crate::sources::TitleMatchSource;
use crate::types::{PartialMetadata, RecordDate};

const PAPER_FIELDS: &str = "title,abstract,year,publicationDate,authors,openAccessPdf,url";
const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct S2Paper {
    pub paper_id: String,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub publication_date: Option<String>,
    pub authors: Vec<String>,
    pub open_access_pdf: Option<String>,
    pub url: Option<String>,
}

impl S2Paper {
    pub fn from_json(v: &Value) -> Result<Self> {
        let paper_id = v
            .get("paperId")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ScienceError::Parse("missing paperId in Semantic Scholar response".into())
            })?
            .to_string();

        let text = |key: &str| {
            v.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
        };

        let authors = v
            .get("authors")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|a| a.get("name").and_then(Value::as_str))
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        let open_access_pdf = v
            .get("openAccessPdf")
            .and_then(|pdf| pdf.get("url"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(ToOwned::to_owned);

        Ok(Self {
            paper_id,
            title: text("title"),
            abstract_text: text("abstract"),
            year: v
                .get("year")
                .and_then(Value::as_i64)
                .and_then(|n| i32::try_from(n).ok()),
            publication_date: text("publicationDate"),
            authors,
            open_access_pdf,
            url: text("url"),
        })
    }

    /// Open-access PDF first, else the paper's landing page. The bare year
    /// is preferred over the full date.
    pub fn into_metadata(self) -> PartialMetadata {
        let date = match (self.year, self.publication_date) {
            (Some(year), _) => Some(RecordDate::Year(year)),
            (None, Some(date)) => Some(RecordDate::Text(date)),
            (None, None) => None,
        };
        PartialMetadata {
            link: self.open_access_pdf.or(self.url),
            title: self.title,
            abstract_text: self.abstract_text,
            date,
            authors: (!self.authors.is_empty()).then_some(self.authors),
        }
    }
}

pub struct SemanticScholarSource {
    client: RateLimitedClient,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarSource {
    pub fn new(config: &ResolverConfig) -> Self {
        Self::with_params(
            &config.sources.semantic_scholar_url,
            config.retry.clone(),
            &config.sources.user_agent,
            config.sources.semantic_scholar_api_key.clone(),
        )
    }

    pub fn with_params(
        base_url: &str,
        policy: RetryConfig,
        user_agent: &str,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client: RateLimitedClient::new(policy, user_agent),
            base_url: base_url.to_string(),
            api_key,
        }
    }

    /// Paper id of the best title match; `None` when nothing matches.
    pub async fn match_title(&self, title: &str) -> Result<Option<String>> {
        let mut url = self.endpoint(&["paper", "search", "match"])?;
        url.query_pairs_mut().append_pair("query", title);

        let json: Value = match self
            .client
            .get_json_with_headers(url.as_str(), self.auth_headers()?)
            .await
        {
            Ok(json) => json,
            Err(ScienceError::NotFound(_)) => {
                debug!(title, "no Semantic Scholar title match");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        Ok(json
            .get("data")
            .and_then(Value::as_array)
            .and_then(|data| data.first())
            .and_then(|paper| paper.get("paperId"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned))
    }

    pub async fn fetch_paper(&self, paper_id: &str) -> Result<S2Paper> {
        let mut url = self.endpoint(&["paper", paper_id])?;
        url.query_pairs_mut().append_pair("fields", PAPER_FIELDS);

        let json: Value = self
            .client
            .get_json_with_headers(url.as_str(), self.auth_headers()?)
            .await?;
        S2Paper::from_json(&json)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ScienceError::Parse(format!("invalid URL {}: {e}", self.base_url)))?;
        {
            let mut segs = url.path_segments_mut().map_err(|_| {
                ScienceError::Parse("invalid Semantic Scholar base URL".to_string())
            })?;
            segs.pop_if_empty();
            for segment in segments {
                segs.push(segment);
            }
        }
        Ok(url)
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let value =
                HeaderValue::from_str(key).map_err(|e| ScienceError::Parse(e.to_string()))?;
            headers.insert(API_KEY_HEADER, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl TitleMatchSource for SemanticScholarSource {
    fn name(&self) -> &str {
        "semantic_scholar"
    }

    async fn match_by_title(&self, title: &str) -> Result<Option<PartialMetadata>> {
        let Some(paper_id) = self.match_title(title).await? else {
            return Ok(None);
        };
        Ok(Some(self.fetch_paper(&paper_id).await?.into_metadata()))
    }
}
