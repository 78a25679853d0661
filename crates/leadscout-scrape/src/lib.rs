//! Scrape surface: strategy building, browser capability traits, bot-challenge
//! handling, and listing-card extraction.

mod anti_detection;
mod browser;
mod listing;
mod orchestrator;
mod strategy;

pub use anti_detection::{AntiDetectionConfig, Viewport, DEFAULT_USER_AGENT};
pub use browser::{
    detect_challenge, BrowserError, BrowserFactory, BrowserSession, FixtureBrowserFactory,
    FixturePage,
};
pub use listing::{ListingExtractor, DEFAULT_MAX_ITEMS, LISTING_CARD_SELECTOR};
pub use orchestrator::{PreloadedContent, ScrapeOrchestrator};
pub use strategy::{build_google_maps_strategies, build_strategies, maps_search_url};

pub const CRATE_NAME: &str = "leadscout-scrape";
