//! Lead extraction: turns scrape artifacts into normalized lead candidates.
//!
//! Structured listings are the primary path. When an artifact carries only
//! page text, a two-level heuristic fallback runs instead: line scanning for
//! email/phone co-occurrence, then a full-text phone sweep. Both trade
//! precision for recall and tag their output with a lower confidence.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use leadscout_core::identity::digit_count;
use leadscout_core::{ArtifactStatus, LeadCandidate, LlmSettings, RawListing, ScrapeArtifact};

mod llm;

pub use llm::{llm_extract, ChatMessage, ChatTransport, HttpChatTransport, TransportError};

pub const CRATE_NAME: &str = "leadscout-extract";

/// Confidence assigned to structured listings that do not declare their own.
const STRUCTURED_CONFIDENCE: f64 = 0.55;
/// Line-scan and full-text fallback caps, per artifact.
const LINE_SCAN_CAP: usize = 20;
const TEXT_SCAN_CAP: usize = 5;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\+?\d[\d\s().\-]{7,}").unwrap());
static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script.*?</script>").unwrap());
static STYLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style.*?</style>").unwrap());

/// Extraction collaborators. Everything optional; the zero-value runs the
/// pure heuristic path.
#[derive(Default)]
pub struct ExtractOptions<'a> {
    pub use_llm: bool,
    pub llm: Option<&'a LlmSettings>,
    pub transport: Option<&'a dyn ChatTransport>,
}

/// Extract lead candidates from a run's artifacts. Returns the leads plus the
/// error strings collected along the way; extraction failures never abort
/// processing of other artifacts.
pub async fn extract_leads(
    artifacts: &[ScrapeArtifact],
    options: ExtractOptions<'_>,
) -> (Vec<LeadCandidate>, Vec<String>) {
    let mut leads = Vec::new();
    let mut errors = Vec::new();

    for artifact in artifacts {
        if artifact.status != ArtifactStatus::Ok {
            if let Some(error) = &artifact.error {
                errors.push(error.clone());
            }
            continue;
        }

        let structured = artifact
            .listings
            .as_ref()
            .filter(|listings| !listings.is_empty());

        if let Some(listings) = structured {
            let before = leads.len();
            leads.extend(
                listings
                    .iter()
                    .filter_map(|listing| listing_to_lead(listing, artifact)),
            );
            debug!(
                step_id = %artifact.step_id,
                listings = listings.len(),
                leads = leads.len() - before,
                "mapped structured listings"
            );
        } else if let Some(html) = &artifact.html {
            let lines = html_to_lines(html);
            leads.extend(heuristic_extract(&lines, artifact));
        }

        if options.use_llm {
            if let (Some(settings), Some(transport), Some(html)) =
                (options.llm, options.transport, &artifact.html)
            {
                let text = html_to_lines(html).join("\n");
                if !text.is_empty() {
                    match llm_extract(&text, settings, transport).await {
                        Ok(extra) => leads.extend(
                            extra
                                .into_iter()
                                .map(|lead| with_segment(lead, artifact)),
                        ),
                        Err(message) => errors.push(message),
                    }
                }
            }
        }
    }

    (leads, errors)
}

/// Map one structured listing to a lead. Sponsored placements and nameless
/// entries are not leads; malformed phones are dropped rather than kept.
fn listing_to_lead(listing: &RawListing, artifact: &ScrapeArtifact) -> Option<LeadCandidate> {
    let name = normalize_text(&listing.name);
    if name.is_empty() || name.eq_ignore_ascii_case("sponsored") {
        return None;
    }

    let mut lead = LeadCandidate::named(name);
    lead.phone = listing
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|p| digit_count(p) >= 7)
        .map(ToString::to_string);
    lead.website = listing.website.clone();
    lead.address = listing.address.as_deref().map(normalize_text).filter(|a| !a.is_empty());
    lead.category = listing.category.as_deref().map(normalize_text).filter(|c| !c.is_empty());
    lead.confidence = listing.confidence.unwrap_or(STRUCTURED_CONFIDENCE).clamp(0.0, 1.0);
    lead.source_url = listing.source_url.clone();
    lead.source = Some(artifact.source.clone());
    Some(with_segment(lead, artifact))
}

fn with_segment(mut lead: LeadCandidate, artifact: &ScrapeArtifact) -> LeadCandidate {
    lead.segment_key = artifact.segment_key.clone();
    lead.segment_level = artifact.segment_level.clone();
    lead.captured_at = Utc::now();
    if lead.source.is_none() {
        lead.source = Some(artifact.source.clone());
    }
    lead
}

/// Free-text fallback. Level one scans lines for email/phone co-occurrence;
/// level two sweeps the whole text for phones with a crude preceding-word
/// window as the company guess.
fn heuristic_extract(lines: &[String], artifact: &ScrapeArtifact) -> Vec<LeadCandidate> {
    let mut leads = Vec::new();

    for line in lines {
        if leads.len() >= LINE_SCAN_CAP {
            break;
        }
        let email = EMAIL_RE.find(line).map(|m| m.as_str().to_string());
        let phone = PHONE_RE
            .find(line)
            .map(|m| m.as_str().trim().to_string())
            .filter(|p| digit_count(p) >= 7);
        if email.is_none() && phone.is_none() {
            continue;
        }

        let raw_name = match line.split_once(" - ") {
            Some((head, _)) => head,
            None => line.as_str(),
        };
        let name = normalize_text(&cap_chars(raw_name, 120));
        if name.is_empty() {
            continue;
        }

        let mut lead = LeadCandidate::named(name);
        lead.confidence = if email.is_some() { 0.5 } else { 0.4 };
        lead.email = email;
        lead.phone = phone;
        leads.push(with_segment(lead, artifact));
    }

    if !leads.is_empty() {
        return leads;
    }

    let text = lines.join(" ");
    for m in PHONE_RE.find_iter(&text).take(TEXT_SCAN_CAP) {
        let phone = m.as_str().trim().to_string();
        if digit_count(&phone) < 7 {
            continue;
        }
        let window = window_before(&text, m.start());
        let words: Vec<&str> = window.split_whitespace().collect();
        let guess = if words.len() >= 6 {
            words[words.len() - 6..words.len() - 1].join(" ")
        } else {
            cap_chars(window, 120)
        };
        let name = normalize_text(&guess);

        let mut lead = LeadCandidate::named(if name.is_empty() {
            "Unknown".to_string()
        } else {
            name
        });
        lead.confidence = 0.3;
        lead.phone = Some(phone);
        leads.push(with_segment(lead, artifact));
    }

    leads
}

/// The 60 chars before a phone match plus the first 20 of the match itself,
/// snapped to char boundaries.
fn window_before(text: &str, match_start: usize) -> &str {
    let mut start = match_start.saturating_sub(60);
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (match_start + 20).min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

fn cap_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Strip tags and decode entities, yielding the visible text lines.
pub fn html_to_lines(html: &str) -> Vec<String> {
    let without_script = SCRIPT_RE.replace_all(html, " ");
    let without_style = STYLE_RE.replace_all(&without_script, " ");
    let document = scraper::Html::parse_document(&without_style);
    document
        .root_element()
        .text()
        .map(|node| node.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

/// Canonical text cleanup for names, addresses, and categories: collapse
/// whitespace, drop control and private-use glyphs (Maps icon placeholders),
/// repair the mis-encoded middle dot, and trim separator punctuation.
pub fn normalize_text(text: &str) -> String {
    let repaired = text.replace("Â·", "·");
    let filtered: String = repaired
        .chars()
        .filter(|c| !c.is_control() && !('\u{E000}'..='\u{F8FF}').contains(c))
        .collect();
    let collapsed = filtered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '·' | '-' | '–' | '|' | ':' | ';' | ','))
        .to_string()
}
