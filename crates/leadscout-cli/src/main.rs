//! Lead search command line. Accepts a JSON payload via stdin or --payload;
//! prints the full response envelope as pretty JSON on stdout.

use std::io::{IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leadscout_core::{RawListing, SearchRequest};
use leadscout_extract::{ChatTransport, HttpChatTransport};
use leadscout_pipeline::{run_search, PipelineDeps};
use leadscout_scrape::{AntiDetectionConfig, PreloadedContent};

#[derive(Debug, Parser)]
#[command(name = "leadscout")]
#[command(about = "Lead search runner: scrape, extract, dedupe, score, persist")]
struct Cli {
    /// Path to a JSON payload (if not piping stdin)
    #[arg(long)]
    payload: Option<PathBuf>,

    /// Enable LLM extraction in addition to heuristics
    #[arg(long)]
    use_llm: bool,
}

fn load_payload(cli: &Cli) -> Result<Option<Value>> {
    let mut stdin = std::io::stdin();
    if !stdin.is_terminal() {
        let mut buffer = String::new();
        stdin
            .read_to_string(&mut buffer)
            .context("reading payload from stdin")?;
        if !buffer.trim().is_empty() {
            if let Ok(value) = serde_json::from_str(&buffer) {
                return Ok(Some(value));
            }
        }
    }

    if let Some(path) = &cli.payload {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading payload file {}", path.display()))?;
        let value = serde_json::from_str(&text)
            .with_context(|| format!("parsing payload file {}", path.display()))?;
        return Ok(Some(value));
    }

    Ok(None)
}

/// Pick up replay content shipped inside the payload: raw page HTML and/or
/// already-structured listings, keyed by step id or query.
fn preloaded_from_payload(payload: &Value) -> PreloadedContent {
    let mut preloaded = PreloadedContent::default();

    if let Some(html_map) = payload.get("preloaded_html").and_then(Value::as_object) {
        for (key, value) in html_map {
            if let Some(html) = value.as_str() {
                preloaded.insert_html(key, html);
            }
        }
    }

    if let Some(json_map) = payload.get("preloaded_json").and_then(Value::as_object) {
        for (key, value) in json_map {
            if let Ok(listings) = serde_json::from_value::<Vec<RawListing>>(value.clone()) {
                preloaded.insert_listings(key, listings);
            }
        }
    }

    preloaded
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let payload = load_payload(&cli)?
        .context("provide a JSON payload via stdin or --payload <path>")?;

    let mut request = SearchRequest::from_payload(&payload);
    if cli.use_llm {
        request.features.use_llm_extraction = true;
    }

    let anti_detection = if request.features.anti_detection {
        payload
            .get("anti_detection")
            .map(AntiDetectionConfig::from_payload)
    } else {
        Some(AntiDetectionConfig::disabled())
    };

    let transport = request
        .features
        .use_llm_extraction
        .then(HttpChatTransport::new);

    let deps = PipelineDeps {
        // A live browser integration is injected by embedding callers;
        // the CLI runs on preloaded content.
        browser: None,
        transport: transport.as_ref().map(|t| t as &dyn ChatTransport),
        preloaded: preloaded_from_payload(&payload),
        anti_detection,
    };

    let response = run_search(&request, deps).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
