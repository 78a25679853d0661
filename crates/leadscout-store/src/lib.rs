//! Durable lead store: SQLite-backed idempotent upserts keyed by lead
//! identity, plus an append-only run log and an optional JSON export.

use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use leadscout_core::identity::identity_key;
use leadscout_core::{PersistenceResult, RunMetadata, ScoredLead};

pub mod dedupe;
pub mod score;

pub use dedupe::dedupe_leads;
pub use score::score_leads;

pub const CRATE_NAME: &str = "leadscout-store";

/// Stable hash of the normalized search-input snapshot, stored with each run
/// for reproducibility and audit.
pub fn search_fingerprint(snapshot: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(snapshot.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct LeadStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl LeadStore {
    /// Open (creating if missing) the store at `db_path` and bring its schema
    /// up to date.
    pub async fn open(db_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating store directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("opening lead store {}", db_path.display()))?;

        let store = Self { pool, db_path };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Create base tables if absent, add columns older stores predate, and
    /// enforce uniqueness on the identity column. NULL identity keys are
    /// distinct in SQLite, so keyless rows always insert freely.
    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_uuid TEXT,
                started_at TEXT,
                ended_at TEXT,
                sources_attempted TEXT,
                errors TEXT,
                stats TEXT,
                search_input_json TEXT,
                search_fingerprint TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS leads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lead_uuid TEXT,
                run_uuid TEXT,
                run_id INTEGER,
                segment_key TEXT,
                segment_level TEXT,
                identity_key TEXT,
                times_seen INTEGER DEFAULT 1,
                first_seen_run_id TEXT,
                last_seen_run_id TEXT,
                company_name TEXT,
                website TEXT,
                phone TEXT,
                email TEXT,
                address TEXT,
                category TEXT,
                contact_name TEXT,
                contact_title TEXT,
                confidence REAL,
                source_url TEXT,
                source TEXT,
                score REAL,
                rationale TEXT,
                captured_at TEXT,
                FOREIGN KEY(run_id) REFERENCES runs(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (table, column, ddl) in [
            ("runs", "run_uuid", "TEXT"),
            ("runs", "search_input_json", "TEXT"),
            ("runs", "search_fingerprint", "TEXT"),
            ("leads", "lead_uuid", "TEXT"),
            ("leads", "run_uuid", "TEXT"),
            ("leads", "segment_key", "TEXT"),
            ("leads", "segment_level", "TEXT"),
            ("leads", "identity_key", "TEXT"),
            ("leads", "times_seen", "INTEGER DEFAULT 1"),
            ("leads", "first_seen_run_id", "TEXT"),
            ("leads", "last_seen_run_id", "TEXT"),
        ] {
            self.ensure_column(table, column, ddl).await?;
        }

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_leads_identity_key ON leads(identity_key)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ensure_column(&self, table: &str, column: &str, ddl: &str) -> anyhow::Result<()> {
        let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
            .fetch_all(&self.pool)
            .await?;
        let exists = rows.iter().any(|row| {
            row.try_get::<String, _>("name")
                .map(|name| name == column)
                .unwrap_or(false)
        });
        if !exists {
            sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {ddl}"))
                .execute(&self.pool)
                .await
                .with_context(|| format!("adding column {table}.{column}"))?;
        }
        Ok(())
    }

    /// Persist one run: a single run-log row, then one upsert (or plain
    /// insert, for keyless leads) per scored lead.
    ///
    /// On identity conflict, `times_seen` increments and `last_seen_run_id`
    /// is overwritten; `score`, `rationale` and `captured_at` always take the
    /// new value; descriptive fields take the new value only when it is
    /// non-null, so a sparse later observation never erases a richer earlier
    /// one.
    pub async fn persist(
        &self,
        leads: &[ScoredLead],
        metadata: &RunMetadata,
    ) -> anyhow::Result<PersistenceResult> {
        let run_row = sqlx::query(
            r#"
            INSERT INTO runs (
                run_uuid, started_at, ended_at, sources_attempted, errors, stats,
                search_input_json, search_fingerprint
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metadata.run_id)
        .bind(metadata.start_time.to_rfc3339())
        .bind(metadata.end_time.map(|t| t.to_rfc3339()))
        .bind(serde_json::to_string(&metadata.sources_attempted)?)
        .bind(serde_json::to_string(&metadata.errors)?)
        .bind(serde_json::to_string(&metadata.stats)?)
        .bind(&metadata.search_input_json)
        .bind(&metadata.search_fingerprint)
        .execute(&self.pool)
        .await
        .context("inserting run record")?;
        let run_rowid = run_row.last_insert_rowid();

        let mut saved_rows = 0;
        for scored in leads {
            let lead = &scored.lead;
            let key = identity_key(lead);
            let first_seen = lead
                .first_seen_run_id
                .clone()
                .unwrap_or_else(|| metadata.run_id.clone());

            let insert = if key.is_some() {
                r#"
                INSERT INTO leads (
                    lead_uuid, run_uuid, run_id, segment_key, segment_level, identity_key,
                    times_seen, first_seen_run_id, last_seen_run_id,
                    company_name, website, phone, email, address, category,
                    contact_name, contact_title, confidence, source_url, source,
                    score, rationale, captured_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(identity_key) DO UPDATE SET
                    times_seen = leads.times_seen + 1,
                    last_seen_run_id = excluded.last_seen_run_id,
                    company_name = COALESCE(excluded.company_name, leads.company_name),
                    website = COALESCE(excluded.website, leads.website),
                    phone = COALESCE(excluded.phone, leads.phone),
                    email = COALESCE(excluded.email, leads.email),
                    address = COALESCE(excluded.address, leads.address),
                    category = COALESCE(excluded.category, leads.category),
                    contact_name = COALESCE(excluded.contact_name, leads.contact_name),
                    contact_title = COALESCE(excluded.contact_title, leads.contact_title),
                    confidence = COALESCE(excluded.confidence, leads.confidence),
                    source_url = COALESCE(excluded.source_url, leads.source_url),
                    source = COALESCE(excluded.source, leads.source),
                    score = excluded.score,
                    rationale = excluded.rationale,
                    captured_at = excluded.captured_at
                "#
            } else {
                r#"
                INSERT INTO leads (
                    lead_uuid, run_uuid, run_id, segment_key, segment_level, identity_key,
                    times_seen, first_seen_run_id, last_seen_run_id,
                    company_name, website, phone, email, address, category,
                    contact_name, contact_title, confidence, source_url, source,
                    score, rationale, captured_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#
            };

            sqlx::query(insert)
                .bind(Uuid::new_v4().to_string())
                .bind(&metadata.run_id)
                .bind(run_rowid)
                .bind(&lead.segment_key)
                .bind(&lead.segment_level)
                .bind(&key)
                .bind(lead.times_seen)
                .bind(&first_seen)
                .bind(&metadata.run_id)
                .bind(&lead.company_name)
                .bind(&lead.website)
                .bind(&lead.phone)
                .bind(&lead.email)
                .bind(&lead.address)
                .bind(&lead.category)
                .bind(&lead.contact_name)
                .bind(&lead.contact_title)
                .bind(lead.confidence)
                .bind(&lead.source_url)
                .bind(&lead.source)
                .bind(scored.score)
                .bind(&scored.rationale)
                .bind(lead.captured_at.to_rfc3339())
                .execute(&self.pool)
                .await
                .with_context(|| format!("persisting lead {}", lead.company_name))?;
            saved_rows += 1;
        }

        info!(
            run_id = %metadata.run_id,
            saved_rows,
            db_path = %self.db_path.display(),
            "run persisted"
        );
        Ok(PersistenceResult {
            saved_rows,
            db_path: Some(self.db_path.display().to_string()),
            json_path: None,
        })
    }
}

/// Denormalized read-only snapshot of the scored leads: each lead's fields
/// flattened together with its score and rationale.
pub fn export_json(leads: &[ScoredLead], path: impl AsRef<Path>) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating export directory {}", parent.display()))?;
    }

    let mut rows = Vec::with_capacity(leads.len());
    for scored in leads {
        let mut value = serde_json::to_value(&scored.lead)?;
        value["score"] = serde_json::json!(scored.score);
        value["rationale"] = serde_json::json!(scored.rationale);
        rows.push(value);
    }
    std::fs::write(path, serde_json::to_string_pretty(&rows)?)
        .with_context(|| format!("writing lead export {}", path.display()))?;
    Ok(())
}
