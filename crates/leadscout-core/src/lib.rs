//! Core domain model and identity types for Lead Scout.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod identity;
mod request;

pub use request::{FeatureFlags, LlmSettings, SearchFilters, SearchRequest, StorageConfig};

pub const CRATE_NAME: &str = "leadscout-core";

/// One unit of scrape work: a query against a source at a given page.
/// Immutable once built; `step_id` is stable so preloaded fixtures and
/// artifacts correlate across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyStep {
    pub source: String,
    pub query: String,
    pub location: Option<String>,
    pub page: u32,
    pub max_pages: u32,
    pub throttle_seconds: f64,
    pub parser_hint: Option<String>,
    pub step_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Ok,
    Skipped,
    Error,
}

/// A listing record as parsed off one page card, before lead normalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawListing {
    pub name: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub source_url: Option<String>,
    pub address: Option<String>,
    pub category: Option<String>,
    pub confidence: Option<f64>,
}

/// Outcome of executing one strategy step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeArtifact {
    pub source: String,
    pub step_id: String,
    pub status: ArtifactStatus,
    pub html: Option<String>,
    pub listings: Option<Vec<RawListing>>,
    pub screenshot_path: Option<String>,
    pub error: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub segment_key: Option<String>,
    pub segment_level: Option<String>,
}

impl ScrapeArtifact {
    fn base(step: &StrategyStep, status: ArtifactStatus) -> Self {
        Self {
            source: step.source.clone(),
            step_id: step.step_id.clone(),
            status,
            html: None,
            listings: None,
            screenshot_path: None,
            error: None,
            fetched_at: Utc::now(),
            segment_key: step.location.clone(),
            segment_level: step.location.as_ref().map(|_| "location".to_string()),
        }
    }

    pub fn ok(step: &StrategyStep, html: Option<String>, listings: Option<Vec<RawListing>>) -> Self {
        Self {
            html,
            listings,
            ..Self::base(step, ArtifactStatus::Ok)
        }
    }

    pub fn skipped(step: &StrategyStep, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::base(step, ArtifactStatus::Skipped)
        }
    }

    pub fn error(step: &StrategyStep, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::base(step, ArtifactStatus::Error)
        }
    }
}

/// One extracted business contact candidate.
///
/// `identity_key` is derived from the candidate's own fields (see
/// [`identity`]) and never supplied by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadCandidate {
    pub company_name: String,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub category: Option<String>,
    pub contact_name: Option<String>,
    pub contact_title: Option<String>,
    pub confidence: f64,
    pub source_url: Option<String>,
    pub source: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub segment_key: Option<String>,
    pub segment_level: Option<String>,
    pub identity_key: Option<String>,
    pub times_seen: i64,
    pub first_seen_run_id: Option<String>,
    pub last_seen_run_id: Option<String>,
}

impl LeadCandidate {
    pub fn named(company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            website: None,
            phone: None,
            email: None,
            address: None,
            category: None,
            contact_name: None,
            contact_title: None,
            confidence: 0.0,
            source_url: None,
            source: None,
            captured_at: Utc::now(),
            segment_key: None,
            segment_level: None,
            identity_key: None,
            times_seen: 1,
            first_seen_run_id: None,
            last_seen_run_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLead {
    pub lead: LeadCandidate,
    pub score: f64,
    pub rationale: String,
}

/// Per-execution record. Append-only once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub sources_attempted: Vec<String>,
    pub errors: Vec<String>,
    pub stats: BTreeMap<String, u64>,
    pub search_input_json: Option<String>,
    pub search_fingerprint: Option<String>,
}

impl RunMetadata {
    pub fn begin() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            start_time: Utc::now(),
            end_time: None,
            sources_attempted: Vec::new(),
            errors: Vec::new(),
            stats: BTreeMap::new(),
            search_input_json: None,
            search_fingerprint: None,
        }
    }
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self::begin()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    pub deduped: usize,
    pub kept: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceResult {
    pub saved_rows: usize,
    pub db_path: Option<String>,
    pub json_path: Option<String>,
}

/// Final response envelope. Every field emitted on the wire is named here;
/// serialization is this explicit contract, not a mirror of internals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadSearchResponse {
    pub metadata: RunMetadata,
    pub leads: Vec<ScoredLead>,
    pub persistence: Option<PersistenceResult>,
    pub cache: Option<CacheStats>,
    pub logs: Vec<String>,
    pub passthrough: serde_json::Value,
}
