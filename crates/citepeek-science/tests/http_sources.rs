use std::sync::Mutex;

use citepeek_science::resolver::ResolutionMethod;
use citepeek_science::{
    CitationEngine, MetadataRecord, PresentationSink, ReferenceAnchor, Resolution, ResolverConfig,
};
use mockito::{Matcher, Server, ServerGuard};

const SMITH_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/1909.12345v1</id>
    <published>2019-09-26T17:00:00Z</published>
    <title>Deep Learning for Everyone</title>
    <summary>We explain deep learning.</summary>
    <author><name>Jane Smith</name></author>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2003.00001v2</id>
    <published>2020-03-01T09:00:00Z</published>
    <title>Deep Learning, Again</title>
    <summary>Sequel.</summary>
    <author><name>Jane Smith</name></author>
  </entry>
</feed>
"#;

#[derive(Default)]
struct Recorder(Mutex<Vec<MetadataRecord>>);

impl PresentationSink for Recorder {
    fn display(&self, record: &MetadataRecord, _still_relevant: &dyn Fn() -> bool) {
        self.0.lock().unwrap().push(record.clone());
    }
}

fn engine_for(server: &ServerGuard) -> CitationEngine {
    let mut config = ResolverConfig::default();
    config.sources.arxiv_url = format!("{}/api/query", server.url());
    config.sources.semantic_scholar_url = format!("{}/graph/v1", server.url());
    config.sources.crossref_url = server.url();
    config.retry.min_interval_ms = 0;
    config.retry.base_delay_ms = 1;
    config.retry.rate_limit_wait_ms = 1;
    CitationEngine::from_config(config)
}

#[tokio::test]
async fn compact_key_is_resolved_through_arxiv_search() {
    let mut server = Server::new_async().await;
    let search = server
        .mock("GET", "/api/query")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("search_query".into(), "ti:deep AND au:smith".into()),
            Matcher::UrlEncoded("max_results".into(), "50".into()),
        ]))
        .with_status(200)
        .with_body(SMITH_FEED)
        .create_async()
        .await;
    let sink = Recorder::default();

    let outcome = engine_for(&server)
        .resolve_anchor(&ReferenceAnchor::new("paper.pdf#cite.smith2019deep"), &|| true, &sink)
        .await;

    search.assert_async().await;
    let Resolution::Displayed { method, record } = outcome else {
        panic!("expected a displayed record, got {outcome:?}");
    };
    assert_eq!(method, ResolutionMethod::KeyedSearch);
    assert_eq!(record.full_title, "Deep Learning for Everyone");
    assert_eq!(record.link, "https://arxiv.org/abs/1909.12345v1");
    assert_eq!(record.published_line(), "Published on Sep 26, 2019.");
    assert_eq!(record.authors, vec!["Jane Smith".to_string()]);
}

#[tokio::test]
async fn citation_text_falls_back_to_crossref_after_title_misses() {
    let mut server = Server::new_async().await;
    let title_match = server
        .mock("GET", "/graph/v1/paper/search/match")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"error":"Title match not found"}"#)
        .expect_at_least(1)
        .create_async()
        .await;
    let crossref = server
        .mock("GET", "/works")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{"message":{"items":[{
                "URL": "http://dx.doi.org/10.5555/graphs",
                "title": ["Graph Networks at Scale"],
                "author": [{"given": "Alice", "family": "Jones"}],
                "published": {"date-parts": [[2018]]}
            }]}}"#,
        )
        .create_async()
        .await;

    let outcome = engine_for(&server)
        .resolve_citation_text(
            "Alice Jones, Bob Brown, and Carol White. Graph networks at scale. \
             In Proceedings of ICML, 2018.",
            &|| true,
            &Recorder::default(),
        )
        .await;

    title_match.assert_async().await;
    crossref.assert_async().await;
    let record = outcome.record().expect("crossref record");
    assert_eq!(record.full_title, "Graph Networks at Scale");
    assert_eq!(record.abstract_text, "No abstract found");
    assert_eq!(record.published_line(), "Published in 2018.");
}
