//! Drives strategy steps against a browser capability with anti-detection
//! delays, retry/backoff, and bot-challenge handling.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use leadscout_core::{RawListing, ScrapeArtifact, StrategyStep};

use crate::{
    detect_challenge, maps_search_url, AntiDetectionConfig, BrowserFactory, BrowserSession,
    ListingExtractor, LISTING_CARD_SELECTOR,
};

/// Precomputed content keyed by step id (preferred) or query. Checked before
/// any live-scrape attempt; this is the replay path.
#[derive(Debug, Clone, Default)]
pub struct PreloadedContent {
    html: HashMap<String, String>,
    listings: HashMap<String, Vec<RawListing>>,
}

impl PreloadedContent {
    pub fn insert_html(&mut self, key: impl Into<String>, html: impl Into<String>) {
        self.html.insert(key.into(), html.into());
    }

    pub fn insert_listings(&mut self, key: impl Into<String>, listings: Vec<RawListing>) {
        self.listings.insert(key.into(), listings);
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.listings.is_empty()
    }

    fn lookup<'a, T>(&self, map: &'a HashMap<String, T>, step: &StrategyStep) -> Option<&'a T> {
        map.get(&step.step_id).or_else(|| map.get(&step.query))
    }

    fn artifact_for(&self, step: &StrategyStep) -> Option<ScrapeArtifact> {
        let html = self.lookup(&self.html, step).cloned();
        let listings = self.lookup(&self.listings, step).cloned();
        if html.is_none() && listings.is_none() {
            return None;
        }
        Some(ScrapeArtifact::ok(step, html, listings))
    }
}

enum AttemptFailure {
    Challenge(&'static str),
    Browser(String),
}

impl AttemptFailure {
    fn message(&self) -> String {
        match self {
            AttemptFailure::Challenge(token) => format!("bot challenge detected: {token}"),
            AttemptFailure::Browser(message) => message.clone(),
        }
    }
}

struct AttemptOutcome {
    body_text: String,
    listings: Vec<RawListing>,
    screenshot_path: Option<String>,
}

pub struct ScrapeOrchestrator {
    config: AntiDetectionConfig,
    capture_screenshots: bool,
    extractor: ListingExtractor,
}

impl ScrapeOrchestrator {
    pub fn new(config: AntiDetectionConfig) -> Self {
        Self {
            config,
            capture_screenshots: false,
            extractor: ListingExtractor::default(),
        }
    }

    pub fn with_screenshots(mut self, capture: bool) -> Self {
        self.capture_screenshots = capture;
        self
    }

    /// Execute every step in order, producing exactly one artifact per step.
    /// A failing step never aborts the ones after it.
    pub async fn run(
        &self,
        steps: &[StrategyStep],
        browser: Option<&dyn BrowserFactory>,
        preloaded: &PreloadedContent,
    ) -> Vec<ScrapeArtifact> {
        let mut artifacts = Vec::with_capacity(steps.len());
        for step in steps {
            if let Some(artifact) = preloaded.artifact_for(step) {
                debug!(step_id = %step.step_id, "serving step from preloaded content");
                artifacts.push(artifact);
                continue;
            }

            let Some(factory) = browser else {
                artifacts.push(ScrapeArtifact::skipped(
                    step,
                    "no browser capability configured; supply preloaded content or a browser",
                ));
                continue;
            };

            artifacts.push(self.run_step(step, factory).await);
        }
        artifacts
    }

    async fn run_step(&self, step: &StrategyStep, factory: &dyn BrowserFactory) -> ScrapeArtifact {
        let mut session = match factory.new_session(&self.config).await {
            Ok(session) => session,
            Err(err) => return ScrapeArtifact::error(step, err.to_string()),
        };

        let mut last_failure: Option<AttemptFailure> = None;
        let mut outcome = None;

        for attempt in 1..=self.config.attempts() {
            match self.attempt(step, session.as_mut()).await {
                Ok(success) => {
                    info!(step_id = %step.step_id, attempt, listings = success.listings.len(), "step scraped");
                    outcome = Some(success);
                    break;
                }
                Err(failure) => {
                    warn!(step_id = %step.step_id, attempt, failure = %failure.message(), "scrape attempt failed");
                    last_failure = Some(failure);
                }
            }
        }

        // The session is released on every exit path; close failures are
        // reported to the log only.
        if let Err(err) = session.close().await {
            debug!(step_id = %step.step_id, error = %err, "session close failed");
        }

        match outcome {
            Some(success) => {
                let mut artifact = ScrapeArtifact::ok(
                    step,
                    Some(success.body_text),
                    Some(success.listings),
                );
                artifact.screenshot_path = success.screenshot_path;
                artifact
            }
            None => {
                let reason = last_failure
                    .map(|f| f.message())
                    .unwrap_or_else(|| "no scrape attempt executed".to_string());
                ScrapeArtifact::error(step, reason)
            }
        }
    }

    async fn attempt(
        &self,
        step: &StrategyStep,
        session: &mut dyn BrowserSession,
    ) -> Result<AttemptOutcome, AttemptFailure> {
        let delay = self.config.pre_navigation_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let url = maps_search_url(&step.query, step.page);
        session
            .navigate(&url, self.config.timeout_ms)
            .await
            .map_err(|e| AttemptFailure::Browser(e.to_string()))?;

        if self.config.render_wait_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.render_wait_ms)).await;
        }

        // Best-effort; an absent selector is a normal outcome.
        let appeared = session
            .wait_for_selector(LISTING_CARD_SELECTOR, self.config.timeout_ms)
            .await;
        if !appeared {
            debug!(step_id = %step.step_id, "listing selector did not appear");
        }

        let body_text = session
            .body_text()
            .await
            .map_err(|e| AttemptFailure::Browser(e.to_string()))?;

        if let Some(token) = detect_challenge(&body_text) {
            return Err(AttemptFailure::Challenge(token));
        }

        let cards = match session.listing_cards(LISTING_CARD_SELECTOR).await {
            Ok(cards) => cards,
            Err(err) => {
                debug!(step_id = %step.step_id, error = %err, "card query unavailable");
                Vec::new()
            }
        };
        let listings = self.extractor.extract(&cards);

        let screenshot_path = if self.capture_screenshots {
            let path = format!("screenshot-{}.png", step.step_id);
            match session.screenshot(&path).await {
                Ok(()) => Some(path),
                Err(err) => {
                    debug!(step_id = %step.step_id, error = %err, "screenshot unavailable");
                    None
                }
            }
        } else {
            None
        };

        Ok(AttemptOutcome {
            body_text,
            listings,
            screenshot_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FixtureBrowserFactory, FixturePage};
    use leadscout_core::ArtifactStatus;

    fn step(query: &str) -> StrategyStep {
        StrategyStep {
            source: "google_maps".into(),
            query: query.into(),
            location: None,
            page: 1,
            max_pages: 1,
            throttle_seconds: 0.0,
            parser_hint: Some("maps_listing".into()),
            step_id: format!("google_maps-{query}-p1"),
        }
    }

    fn fast_config(max_retries: u32) -> AntiDetectionConfig {
        AntiDetectionConfig {
            min_delay_ms: 0,
            max_delay_ms: 0,
            render_wait_ms: 0,
            max_retries,
            ..AntiDetectionConfig::default()
        }
    }

    fn card(inner: &str) -> String {
        format!("<div role='article'>{inner}</div>")
    }

    #[tokio::test]
    async fn preloaded_content_wins_without_any_browser_call() {
        let mut preloaded = PreloadedContent::default();
        preloaded.insert_html("google_maps-q-p1", "<html>preloaded</html>");

        // An empty factory would fail any navigation; it must never be hit.
        let factory = FixtureBrowserFactory::new([]);
        let orchestrator = ScrapeOrchestrator::new(fast_config(1));
        let artifacts = orchestrator
            .run(&[step("q")], Some(&factory), &preloaded)
            .await;

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].status, ArtifactStatus::Ok);
        assert_eq!(artifacts[0].html.as_deref(), Some("<html>preloaded</html>"));
        assert_eq!(factory.launched_sessions(), 0);
    }

    #[tokio::test]
    async fn preloaded_lookup_falls_back_to_query_key() {
        let mut preloaded = PreloadedContent::default();
        preloaded.insert_listings(
            "plumber seattle",
            vec![RawListing {
                name: "Best Plumbing Co".into(),
                ..RawListing::default()
            }],
        );

        let orchestrator = ScrapeOrchestrator::new(fast_config(1));
        let artifacts = orchestrator
            .run(&[step("plumber seattle")], None, &preloaded)
            .await;

        assert_eq!(artifacts[0].status, ArtifactStatus::Ok);
        let listings = artifacts[0].listings.as_ref().unwrap();
        assert_eq!(listings[0].name, "Best Plumbing Co");
    }

    #[tokio::test]
    async fn missing_browser_yields_skipped_not_error() {
        let orchestrator = ScrapeOrchestrator::new(fast_config(1));
        let artifacts = orchestrator
            .run(&[step("q")], None, &PreloadedContent::default())
            .await;

        assert_eq!(artifacts[0].status, ArtifactStatus::Skipped);
        assert!(artifacts[0].error.as_deref().unwrap().contains("browser"));
    }

    #[tokio::test]
    async fn successful_attempt_extracts_listings_and_closes_session() {
        let factory = FixtureBrowserFactory::new([FixturePage::with_cards(
            "Real Shop body",
            vec![card(
                "<div role='heading'>Real Shop</div><span>Call +1 555-111-2222</span>",
            )],
        )]);

        let orchestrator = ScrapeOrchestrator::new(fast_config(2));
        let artifacts = orchestrator
            .run(&[step("q")], Some(&factory), &PreloadedContent::default())
            .await;

        let artifact = &artifacts[0];
        assert_eq!(artifact.status, ArtifactStatus::Ok);
        assert_eq!(artifact.html.as_deref(), Some("Real Shop body"));
        let listings = artifact.listings.as_ref().unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].phone.as_deref(), Some("+1 555-111-2222"));
        assert_eq!(factory.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn captcha_page_consumes_retries_then_errors() {
        let factory = FixtureBrowserFactory::new([
            FixturePage::text("Please solve the captcha to continue"),
            FixturePage::text("still captcha here"),
        ]);

        let orchestrator = ScrapeOrchestrator::new(fast_config(2));
        let artifacts = orchestrator
            .run(&[step("q")], Some(&factory), &PreloadedContent::default())
            .await;

        let artifact = &artifacts[0];
        assert_eq!(artifact.status, ArtifactStatus::Error);
        assert!(artifact.error.as_deref().unwrap().contains("captcha"));
        assert_eq!(factory.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn challenge_then_clean_page_recovers_within_retry_budget() {
        let factory = FixtureBrowserFactory::new([
            FixturePage::text("unusual traffic detected"),
            FixturePage::with_cards("clean page", vec![card("<h2>Corner Bakery</h2>")]),
        ]);

        let orchestrator = ScrapeOrchestrator::new(fast_config(2));
        let artifacts = orchestrator
            .run(&[step("q")], Some(&factory), &PreloadedContent::default())
            .await;

        assert_eq!(artifacts[0].status, ArtifactStatus::Ok);
        assert_eq!(
            artifacts[0].listings.as_ref().unwrap()[0].name,
            "Corner Bakery"
        );
    }

    #[tokio::test]
    async fn step_failures_are_isolated_from_later_steps() {
        let factory = FixtureBrowserFactory::new([
            FixturePage::failing("net::ERR_CONNECTION_RESET"),
            FixturePage::with_cards("fine", vec![card("<h2>Second Shop</h2>")]),
        ]);

        let orchestrator = ScrapeOrchestrator::new(fast_config(1));
        let artifacts = orchestrator
            .run(
                &[step("first"), step("second")],
                Some(&factory),
                &PreloadedContent::default(),
            )
            .await;

        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].status, ArtifactStatus::Error);
        assert!(artifacts[0]
            .error
            .as_deref()
            .unwrap()
            .contains("ERR_CONNECTION_RESET"));
        assert_eq!(artifacts[1].status, ArtifactStatus::Ok);
        assert_eq!(factory.closed_sessions(), 2);
    }

    #[tokio::test]
    async fn screenshots_are_captured_only_when_enabled() {
        let factory = FixtureBrowserFactory::new([FixturePage::text("page")]);
        let orchestrator = ScrapeOrchestrator::new(fast_config(1)).with_screenshots(true);
        let artifacts = orchestrator
            .run(&[step("q")], Some(&factory), &PreloadedContent::default())
            .await;
        assert_eq!(
            artifacts[0].screenshot_path.as_deref(),
            Some("screenshot-google_maps-q-p1.png")
        );

        let factory = FixtureBrowserFactory::new([FixturePage::text("page")]);
        let orchestrator = ScrapeOrchestrator::new(fast_config(1));
        let artifacts = orchestrator
            .run(&[step("q")], Some(&factory), &PreloadedContent::default())
            .await;
        assert_eq!(artifacts[0].screenshot_path, None);
    }
}
