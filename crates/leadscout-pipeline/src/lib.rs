//! End-to-end lead search run: strategies, scrape, extract, dedupe, score,
//! persist, response assembly.
//!
//! Partial success is the common case. Step and extraction failures land in
//! `metadata.errors`; only persistence failures abort the run.

use std::path::Path;

use chrono::Utc;
use tracing::{info, warn};

use leadscout_core::{
    ArtifactStatus, LeadSearchResponse, PersistenceResult, RunMetadata, ScoredLead, SearchRequest,
};
use leadscout_extract::{extract_leads, ChatTransport, ExtractOptions};
use leadscout_scrape::{
    build_strategies, AntiDetectionConfig, BrowserFactory, PreloadedContent, ScrapeOrchestrator,
};
use leadscout_store::{dedupe_leads, export_json, score_leads, search_fingerprint, LeadStore};

pub const CRATE_NAME: &str = "leadscout-pipeline";

const DEFAULT_DB_PATH: &str = "./data/lead_search.db";

/// Injected collaborators for one run. Everything optional: no browser means
/// steps without preloaded content are skipped, no transport means no LLM
/// augmentation.
#[derive(Default)]
pub struct PipelineDeps<'a> {
    pub browser: Option<&'a dyn BrowserFactory>,
    pub transport: Option<&'a dyn ChatTransport>,
    pub preloaded: PreloadedContent,
    pub anti_detection: Option<AntiDetectionConfig>,
}

/// Execute one lead search run and assemble the response envelope.
pub async fn run_search(
    request: &SearchRequest,
    deps: PipelineDeps<'_>,
) -> anyhow::Result<LeadSearchResponse> {
    let mut metadata = RunMetadata::begin();
    metadata.sources_attempted = request.sources.clone();
    let snapshot = request.snapshot_json();
    metadata.search_fingerprint = Some(search_fingerprint(&snapshot));
    metadata.search_input_json = Some(snapshot);

    let mut logs = Vec::new();

    let steps = build_strategies(request);
    info!(run_id = %metadata.run_id, steps = steps.len(), "strategies built");
    logs.push(format!("built {} strategy steps", steps.len()));

    let config = deps.anti_detection.clone().unwrap_or_else(|| {
        if request.features.anti_detection {
            AntiDetectionConfig::default()
        } else {
            AntiDetectionConfig::disabled()
        }
    });
    let orchestrator =
        ScrapeOrchestrator::new(config).with_screenshots(request.features.capture_screenshots);
    let artifacts = orchestrator
        .run(&steps, deps.browser, &deps.preloaded)
        .await;

    let ok_count = artifacts
        .iter()
        .filter(|a| a.status == ArtifactStatus::Ok)
        .count();
    logs.push(format!(
        "scraped {} steps: {} ok, {} skipped, {} errored",
        artifacts.len(),
        ok_count,
        artifacts
            .iter()
            .filter(|a| a.status == ArtifactStatus::Skipped)
            .count(),
        artifacts
            .iter()
            .filter(|a| a.status == ArtifactStatus::Error)
            .count(),
    ));

    let use_llm = request.features.use_llm_extraction;
    let options = ExtractOptions {
        use_llm,
        llm: use_llm.then_some(&request.llm),
        transport: deps.transport,
    };
    let (leads, extract_errors) = extract_leads(&artifacts, options).await;
    let leads_raw = leads.len();

    let (deduped, cache_stats) = dedupe_leads(leads);
    logs.push(format!(
        "{} raw leads, {} kept after dedupe ({} duplicates)",
        leads_raw, cache_stats.kept, cache_stats.deduped
    ));

    let mut scored = score_leads(deduped, &request.filters);
    if request.max_results > 0 && scored.len() > request.max_results {
        scored.truncate(request.max_results);
        logs.push(format!("truncated to top {} leads", request.max_results));
    }

    metadata.errors.extend(extract_errors);
    metadata.stats.insert("strategies".into(), steps.len() as u64);
    metadata
        .stats
        .insert("artifacts".into(), artifacts.len() as u64);
    metadata.stats.insert("leads_raw".into(), leads_raw as u64);
    metadata
        .stats
        .insert("leads_scored".into(), scored.len() as u64);
    metadata.end_time = Some(Utc::now());

    let persistence = persist_if_configured(request, &scored, &metadata).await?;
    if let Some(result) = &persistence {
        logs.push(format!("persisted {} rows", result.saved_rows));
    }

    if !metadata.errors.is_empty() {
        warn!(
            run_id = %metadata.run_id,
            errors = metadata.errors.len(),
            "run finished with partial failures"
        );
    }

    Ok(LeadSearchResponse {
        metadata,
        leads: scored,
        persistence,
        cache: Some(cache_stats),
        logs,
        passthrough: request.passthrough.clone(),
    })
}

/// Persistence runs when a sqlite path or a JSON export is requested.
/// Failures here propagate; silent data loss is worse than a failed run.
async fn persist_if_configured(
    request: &SearchRequest,
    scored: &[ScoredLead],
    metadata: &RunMetadata,
) -> anyhow::Result<Option<PersistenceResult>> {
    let storage = &request.storage;
    if storage.sqlite_path.is_none() && !storage.json_export {
        return Ok(None);
    }

    let db_path = storage
        .sqlite_path
        .clone()
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
    let store = LeadStore::open(&db_path).await?;
    let mut result = store.persist(scored, metadata).await?;

    if storage.json_export {
        let json_path = storage.json_path.clone().unwrap_or_else(|| {
            Path::new(&db_path)
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("leads.json")
                .display()
                .to_string()
        });
        export_json(scored, &json_path)?;
        result.json_path = Some(json_path);
    }

    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadscout_core::RawListing;
    use serde_json::json;
    use sqlx::Row;

    fn plumber_request(db_path: &str) -> SearchRequest {
        SearchRequest::from_payload(&json!({
            "keywords": ["plumber"],
            "locations": ["seattle"],
            "pages_per_source": 1,
            "sources": ["google_maps"],
            "filters": {"must_have_phone": true},
            "storage": {"sqlite_path": db_path},
            "features": {"anti_detection": false},
            "passthrough": {"job": 7},
        }))
    }

    fn plumber_listing() -> RawListing {
        RawListing {
            name: "Best Plumbing Co".into(),
            phone: Some("+1 206-555-0100".into()),
            website: Some("https://bestplumbing.example".into()),
            address: Some("123 Main St".into()),
            category: Some("Plumber".into()),
            ..RawListing::default()
        }
    }

    fn preloaded_plumbers(listings: Vec<RawListing>) -> PreloadedContent {
        let mut preloaded = PreloadedContent::default();
        preloaded.insert_listings("google_maps-plumber-seattle-p1", listings);
        preloaded
    }

    #[tokio::test]
    async fn preloaded_run_extracts_scores_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("leads.db").display().to_string();
        let request = plumber_request(&db_path);

        let deps = PipelineDeps {
            preloaded: preloaded_plumbers(vec![plumber_listing()]),
            ..PipelineDeps::default()
        };
        let response = run_search(&request, deps).await.unwrap();

        assert_eq!(response.leads.len(), 1);
        let top = &response.leads[0];
        assert_eq!(top.lead.company_name, "Best Plumbing Co");
        // base 0.2 + has_phone 0.2
        assert!((top.score - 0.4).abs() < 1e-9);
        assert_eq!(top.rationale, "has_phone");
        assert_eq!(top.lead.segment_key.as_deref(), Some("seattle"));

        let persistence = response.persistence.unwrap();
        assert_eq!(persistence.saved_rows, 1);
        assert_eq!(persistence.db_path.as_deref(), Some(db_path.as_str()));

        assert_eq!(response.metadata.stats["strategies"], 1);
        assert_eq!(response.metadata.stats["leads_scored"], 1);
        assert!(response.metadata.search_fingerprint.is_some());
        assert_eq!(response.passthrough, json!({"job": 7}));
    }

    #[tokio::test]
    async fn duplicate_phones_collapse_within_a_run() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("leads.db").display().to_string();
        let request = plumber_request(&db_path);

        let mut second = plumber_listing();
        second.name = "Best Plumbing Company".into();
        second.phone = Some("+1 (206) 555-0100".into());
        second.website = None;

        let deps = PipelineDeps {
            preloaded: preloaded_plumbers(vec![plumber_listing(), second]),
            ..PipelineDeps::default()
        };
        let response = run_search(&request, deps).await.unwrap();

        assert_eq!(response.leads.len(), 1);
        let cache = response.cache.unwrap();
        assert_eq!(cache.kept, 1);
        assert_eq!(cache.deduped, 1);
        assert_eq!(response.metadata.stats["leads_raw"], 2);
    }

    #[tokio::test]
    async fn rerunning_the_same_search_merges_in_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("leads.db").display().to_string();
        let request = plumber_request(&db_path);

        for _ in 0..2 {
            let deps = PipelineDeps {
                preloaded: preloaded_plumbers(vec![plumber_listing()]),
                ..PipelineDeps::default()
            };
            run_search(&request, deps).await.unwrap();
        }

        let store = LeadStore::open(&db_path).await.unwrap();
        let row = sqlx::query("SELECT times_seen FROM leads")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.try_get::<i64, _>("times_seen").unwrap(), 2);
    }

    #[tokio::test]
    async fn no_browser_and_no_fixture_is_a_partial_not_a_failure() {
        let request = SearchRequest::from_payload(&json!({
            "keywords": ["plumber"],
            "locations": ["seattle"],
            "pages_per_source": 1,
            "storage": {},
        }));

        let response = run_search(&request, PipelineDeps::default()).await.unwrap();
        assert!(response.leads.is_empty());
        assert!(response.persistence.is_none());
        assert_eq!(response.metadata.errors.len(), 1);
        assert!(response.metadata.errors[0].contains("browser"));
    }

    #[tokio::test]
    async fn max_results_caps_the_returned_leads() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("leads.db").display().to_string();
        let mut request = plumber_request(&db_path);
        request.max_results = 2;

        let listings = (0..5)
            .map(|i| RawListing {
                name: format!("Shop {i}"),
                phone: Some(format!("+1 206 555 01{i:02}")),
                ..RawListing::default()
            })
            .collect();
        let deps = PipelineDeps {
            preloaded: preloaded_plumbers(listings),
            ..PipelineDeps::default()
        };
        let response = run_search(&request, deps).await.unwrap();
        assert_eq!(response.leads.len(), 2);
        assert_eq!(response.metadata.stats["leads_scored"], 2);
    }

    #[tokio::test]
    async fn json_export_writes_the_side_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("leads.db").display().to_string();
        let json_path = dir.path().join("export.json").display().to_string();
        let mut request = plumber_request(&db_path);
        request.storage.json_export = true;
        request.storage.json_path = Some(json_path.clone());

        let deps = PipelineDeps {
            preloaded: preloaded_plumbers(vec![plumber_listing()]),
            ..PipelineDeps::default()
        };
        let response = run_search(&request, deps).await.unwrap();
        assert_eq!(
            response.persistence.unwrap().json_path.as_deref(),
            Some(json_path.as_str())
        );

        let exported: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(exported[0]["company_name"], "Best Plumbing Co");
    }
}
