use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use citepeek_science::layout::StaticLayout;
use citepeek_science::references::Identifiers;
use citepeek_science::resolver::ResolverChain;
use citepeek_science::{
    CitationEngine, MetadataRecord, Miss, PresentationSink, ReferenceAnchor, Resolution,
    ResolverConfig,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "citepeek",
    about = "Resolve citation links in papers to titles, authors and abstracts",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting CITEPEEK_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Config file to read instead of the default location.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up the paper a citation refers to.
    Resolve {
        #[command(flatten)]
        input: Input,

        /// Pre-extracted page layout (JSON) used to find the text an --href points at.
        #[arg(long, requires = "href", value_name = "FILE")]
        layout: Option<PathBuf>,
    },

    /// Show the identifiers a citation yields, without any network lookups.
    Parse {
        #[command(flatten)]
        input: Input,

        /// Pre-extracted page layout (JSON) used to find the text an --href points at.
        #[arg(long, requires = "href", value_name = "FILE")]
        layout: Option<PathBuf>,
    },

    /// Print the effective configuration.
    Config,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Input {
    /// Bibliography entry text, e.g. "J. Smith. Deep Learning. arXiv:1909.12345, 2019."
    #[arg(long)]
    citation: Option<String>,

    /// Internal link, e.g. "#cite.smith2019deep".
    #[arg(long)]
    href: Option<String>,
}

// ─── Presentation ───────────────────────────────────────────────────────────

/// Prints records to stdout. Silent in JSON mode, where the whole
/// resolution is printed afterwards instead.
struct ConsoleSink {
    quiet: bool,
}

impl PresentationSink for ConsoleSink {
    fn display(&self, record: &MetadataRecord, still_relevant: &dyn Fn() -> bool) {
        if self.quiet || !still_relevant() {
            return;
        }
        println!("{}", record.full_title);
        println!("{}", record.authors.join(", "));
        println!("{}", record.published_line());
        println!("{}", record.link);
        println!();
        println!("{}", record.abstract_text);
    }
}

// ─── Main ───────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let start = Instant::now();
    let cli = Cli::parse();
    let json_output = cli.json || std::env::var("CITEPEEK_JSON").as_deref() == Ok("1");
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Resolve { input, layout } => {
            let engine = with_layout(CitationEngine::from_config(config), layout.as_deref())?;
            let sink = ConsoleSink { quiet: json_output };

            let outcome = match (input.href, input.citation) {
                (Some(href), _) => {
                    engine
                        .resolve_anchor(&ReferenceAnchor::new(href), &|| true, &sink)
                        .await
                }
                (None, Some(citation)) => {
                    engine.resolve_citation_text(&citation, &|| true, &sink).await
                }
                (None, None) => bail!("one of --citation or --href is required"),
            };

            if json_output {
                print_json(&serde_json::json!({
                    "status": if outcome.record().is_some() { "ok" } else { "miss" },
                    "data": outcome,
                    "meta": { "duration_ms": start.elapsed().as_millis() as u64 }
                }))?;
            } else if let Resolution::NoResult { miss } = outcome {
                println!("No result: {}", describe_miss(miss));
            }
        }

        Commands::Parse { input, layout } => {
            // No sources attached, so nothing here can reach the network.
            let engine = with_layout(
                CitationEngine::new(config, ResolverChain::new()),
                layout.as_deref(),
            )?;

            let parsed = match (input.href, input.citation) {
                (Some(href), _) => engine.identify_anchor(&ReferenceAnchor::new(href)).await,
                (None, Some(citation)) => engine
                    .parser()
                    .parse_citation(&citation)
                    .ok_or(Miss::NoIdentifiers),
                (None, None) => bail!("one of --citation or --href is required"),
            };

            match (parsed, json_output) {
                (Ok(ids), true) => {
                    let candidates = candidate_titles(&engine, &ids);
                    print_json(&serde_json::json!({
                        "status": "ok",
                        "data": { "identifiers": ids, "candidates": candidates }
                    }))?
                }
                (Err(miss), true) => {
                    print_json(&serde_json::json!({ "status": "miss", "data": { "miss": miss } }))?
                }
                (Ok(ids), false) => print_identifiers(&ids, &candidate_titles(&engine, &ids)),
                (Err(miss), false) => println!("No identifiers: {}", describe_miss(miss)),
            }
        }

        Commands::Config => {
            if json_output {
                print_json(&serde_json::json!({ "status": "ok", "data": config }))?;
            } else {
                print!("{}", config.to_toml()?);
            }
        }
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<ResolverConfig> {
    match path {
        Some(path) => {
            let mut config = ResolverConfig::load_from(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            config.apply_env();
            Ok(config)
        }
        None => Ok(ResolverConfig::load()?),
    }
}

fn with_layout(engine: CitationEngine, layout: Option<&Path>) -> Result<CitationEngine> {
    let Some(path) = layout else {
        return Ok(engine);
    };
    let layout = StaticLayout::load(path)
        .with_context(|| format!("reading layout {}", path.display()))?;
    debug!(path = %path.display(), pages = layout.pages.len(), "layout loaded");
    Ok(engine.with_layout(Arc::new(layout)))
}

/// Every title the parser would offer, in the order the resolver tries them.
fn candidate_titles(engine: &CitationEngine, ids: &Identifiers) -> Vec<String> {
    match ids {
        Identifiers::FreeText { citation } => engine.parser().candidates(citation).collect(),
        _ => Vec::new(),
    }
}

fn print_identifiers(ids: &Identifiers, candidates: &[String]) {
    match ids {
        Identifiers::Keyed(key) => {
            println!(
                "BibKey: author={} year={} title_prefix={}",
                key.author, key.year, key.title_prefix
            );
        }
        Identifiers::Arxiv(id) => println!("arXiv: {}", id.versioned()),
        Identifiers::FreeText { citation } => {
            println!("Citation: {citation}");
            if candidates.is_empty() {
                println!("No candidate titles; the whole citation would be searched.");
            }
            for (rank, title) in candidates.iter().enumerate() {
                println!("  {}. {title}", rank + 1);
            }
        }
    }
}

fn describe_miss(miss: Miss) -> &'static str {
    match miss {
        Miss::NotCitationLink => "the link does not point at a reference",
        Miss::NoDestination => "the link destination could not be resolved (pass --layout)",
        Miss::EmptyWindow => "no text near the link destination",
        Miss::NoCitation => "no citation text could be isolated",
        Miss::NoIdentifiers => "nothing usable in the citation text",
        Miss::Exhausted => "no source found a match",
        Miss::TimedOut => "lookup timed out",
    }
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}
