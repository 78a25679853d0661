//! Browser capability seam: the minimal operation set the orchestrator needs,
//! plus a deterministic fixture implementation for replay and tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::AntiDetectionConfig;

/// Page states that indicate automated-traffic detection.
const CHALLENGE_TOKENS: [&str; 4] = [
    "captcha",
    "unusual traffic",
    "verify you are human",
    "recaptcha",
];

/// Case-insensitive bot-challenge probe over rendered page text. Returns the
/// matched token so failure messages can name it.
pub fn detect_challenge(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    CHALLENGE_TOKENS
        .iter()
        .find(|token| lower.contains(**token))
        .copied()
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("page read failed: {0}")]
    PageRead(String),
    #[error("screenshot failed: {0}")]
    Screenshot(String),
    #[error("session close failed: {0}")]
    Close(String),
}

/// One live page/context handle. All methods are fallible; optional
/// capabilities report absence through their return value, never by panicking.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<(), BrowserError>;

    /// Best-effort wait for a selector. `false` means it never appeared;
    /// callers treat that as a normal outcome.
    async fn wait_for_selector(&mut self, selector: &str, timeout_ms: u64) -> bool;

    /// Visible text of the page body.
    async fn body_text(&mut self) -> Result<String, BrowserError>;

    /// Outer HTML of each element matching `selector`, in document order.
    async fn listing_cards(&mut self, selector: &str) -> Result<Vec<String>, BrowserError>;

    async fn screenshot(&mut self, path: &str) -> Result<(), BrowserError>;

    /// Release the underlying page/context. Callers swallow failures.
    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// Produces sessions with the anti-detection configuration already applied.
#[async_trait]
pub trait BrowserFactory: Send + Sync {
    async fn new_session(
        &self,
        config: &AntiDetectionConfig,
    ) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// One scripted page served by the fixture browser. Each navigation consumes
/// the next page in the queue, so retry behavior can be scripted too.
#[derive(Debug, Clone, Default)]
pub struct FixturePage {
    pub body_text: String,
    pub cards: Vec<String>,
    pub navigation_error: Option<String>,
}

impl FixturePage {
    pub fn text(body_text: impl Into<String>) -> Self {
        Self {
            body_text: body_text.into(),
            cards: Vec::new(),
            navigation_error: None,
        }
    }

    pub fn with_cards(body_text: impl Into<String>, cards: Vec<String>) -> Self {
        Self {
            body_text: body_text.into(),
            cards,
            navigation_error: None,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            body_text: String::new(),
            cards: Vec::new(),
            navigation_error: Some(message.into()),
        }
    }
}

/// Deterministic replay implementation of the browser capability. Selected by
/// injection wherever a live browser would otherwise be supplied.
#[derive(Debug, Default)]
pub struct FixtureBrowserFactory {
    pages: Arc<Mutex<VecDeque<FixturePage>>>,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl FixtureBrowserFactory {
    pub fn new(pages: impl IntoIterator<Item = FixturePage>) -> Self {
        Self {
            pages: Arc::new(Mutex::new(pages.into_iter().collect())),
            launches: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn launched_sessions(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserFactory for FixtureBrowserFactory {
    async fn new_session(
        &self,
        _config: &AntiDetectionConfig,
    ) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixtureSession {
            pages: Arc::clone(&self.pages),
            closes: Arc::clone(&self.closes),
            current: None,
        }))
    }
}

struct FixtureSession {
    pages: Arc<Mutex<VecDeque<FixturePage>>>,
    closes: Arc<AtomicUsize>,
    current: Option<FixturePage>,
}

#[async_trait]
impl BrowserSession for FixtureSession {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<(), BrowserError> {
        let next = self.pages.lock().await.pop_front();
        match next {
            Some(page) => {
                if let Some(message) = &page.navigation_error {
                    let message = message.clone();
                    self.current = None;
                    return Err(BrowserError::Navigation(message));
                }
                self.current = Some(page);
                Ok(())
            }
            None => Err(BrowserError::Navigation(format!(
                "no scripted page left for {url}"
            ))),
        }
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout_ms: u64) -> bool {
        let _ = selector;
        self.current
            .as_ref()
            .map(|page| !page.cards.is_empty())
            .unwrap_or(false)
    }

    async fn body_text(&mut self) -> Result<String, BrowserError> {
        self.current
            .as_ref()
            .map(|page| page.body_text.clone())
            .ok_or_else(|| BrowserError::PageRead("no page loaded".into()))
    }

    async fn listing_cards(&mut self, _selector: &str) -> Result<Vec<String>, BrowserError> {
        self.current
            .as_ref()
            .map(|page| page.cards.clone())
            .ok_or_else(|| BrowserError::PageRead("no page loaded".into()))
    }

    async fn screenshot(&mut self, _path: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.current = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_tokens_match_case_insensitively() {
        assert_eq!(
            detect_challenge("Please solve the CAPTCHA to continue"),
            Some("captcha")
        );
        assert_eq!(
            detect_challenge("We detected Unusual Traffic from your network"),
            Some("unusual traffic")
        );
        assert_eq!(detect_challenge("please Verify You Are Human"), Some("verify you are human"));
        assert_eq!(detect_challenge("protected by reCAPTCHA v3"), Some("captcha"));
        assert_eq!(detect_challenge("Best Plumbing Co — open 9-5"), None);
    }

    #[tokio::test]
    async fn fixture_session_replays_pages_in_order() {
        let factory = FixtureBrowserFactory::new([
            FixturePage::text("first"),
            FixturePage::text("second"),
        ]);
        let config = AntiDetectionConfig::disabled();
        let mut session = factory.new_session(&config).await.unwrap();

        session.navigate("https://x/1", 1000).await.unwrap();
        assert_eq!(session.body_text().await.unwrap(), "first");
        session.navigate("https://x/2", 1000).await.unwrap();
        assert_eq!(session.body_text().await.unwrap(), "second");

        let err = session.navigate("https://x/3", 1000).await.unwrap_err();
        assert!(matches!(err, BrowserError::Navigation(_)));

        session.close().await.unwrap();
        assert_eq!(factory.launched_sessions(), 1);
        assert_eq!(factory.closed_sessions(), 1);
    }
}
