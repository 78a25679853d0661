//! Heuristic listing-card parser: turns one semi-structured Maps-style card
//! into a typed raw listing.
//!
//! Detection priority is explicit label > positional scan, and each positional
//! scan excludes lines already consumed by an earlier field.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use leadscout_core::{identity::digit_count, RawListing};

pub const DEFAULT_MAX_ITEMS: usize = 20;

/// Maps renders each result as an article-role container.
pub const LISTING_CARD_SELECTOR: &str = "div[role='article']";

const HEADING_SELECTORS: [&str; 6] = [
    "[role='heading']",
    "h1",
    "h2",
    "h3",
    "div.fontHeadlineSmall",
    "span.DkEaL",
];

const WEBSITE_SELECTORS: [&str; 2] = ["a[data-value='Website']", "a[aria-label='Website']"];

const PLACE_SELECTOR: &str = "a[href*='/maps/place/']";
const ANY_LINK_SELECTOR: &str = "a[href]";

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\d[\d\s().\-]{7,}").expect("phone pattern"));
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"<>]+"#).expect("url pattern"));
static RATING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d\.\d").expect("rating pattern"));
static ADDRESS_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:address|addr)\s*:\s*(.+)").expect("address label"));
static CATEGORY_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bcategory\s*:\s*(.+)").expect("category label"));
static DIGIT_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digit run"));

/// Category phrases that Maps prepends to an address segment.
const CATEGORY_PREFIXES: [&str; 12] = [
    "restaurant",
    "cafe",
    "coffee shop",
    "bar",
    "store",
    "shop",
    "plumber",
    "electrician",
    "contractor",
    "salon",
    "repair shop",
    "dentist",
];

const STREET_TOKENS: [&str; 24] = [
    "st", "street", "ave", "avenue", "rd", "road", "blvd", "boulevard", "dr", "drive", "ln",
    "lane", "way", "ct", "court", "pl", "place", "hwy", "highway", "pkwy", "parkway", "suite",
    "ste", "unit",
];

pub struct ListingExtractor {
    max_items: usize,
}

impl Default for ListingExtractor {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

impl ListingExtractor {
    pub fn new(max_items: usize) -> Self {
        Self { max_items }
    }

    /// Parse each card HTML fragment into a raw listing, preserving card
    /// order and capping at the configured item count. Sponsored placements
    /// are not leads and are dropped here.
    pub fn extract(&self, cards: &[String]) -> Vec<RawListing> {
        let mut listings = Vec::new();
        for card in cards {
            if listings.len() >= self.max_items {
                break;
            }
            if let Some(listing) = extract_card(card) {
                listings.push(listing);
            }
        }
        listings
    }
}

fn extract_card(card_html: &str) -> Option<RawListing> {
    let fragment = Html::parse_fragment(card_html);
    let lines = card_lines(&fragment);
    if lines.is_empty() {
        return None;
    }
    let text = lines.join("\n");

    let name = heading_name(&fragment).unwrap_or_else(|| lines[0].clone());
    if name.eq_ignore_ascii_case("sponsored") {
        return None;
    }

    let phone = first_phone(&text);
    let website = website_url(&fragment, &text);
    let source_url = place_url(&fragment);
    let (category, address) = category_and_address(&lines, &name, phone.as_deref(), &text);

    Some(RawListing {
        name,
        phone,
        website,
        source_url,
        address,
        category,
        confidence: None,
    })
}

/// Text nodes of the card, trimmed, in document order. Maps cards put each
/// field in its own element, so text nodes line up with visual lines.
fn card_lines(fragment: &Html) -> Vec<String> {
    fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn select_first_text(fragment: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    fragment
        .select(&sel)
        .next()
        .map(|node| node.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn select_first_href(fragment: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    fragment
        .select(&sel)
        .next()
        .and_then(|node| node.value().attr("href"))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
}

fn heading_name(fragment: &Html) -> Option<String> {
    HEADING_SELECTORS
        .iter()
        .find_map(|selector| select_first_text(fragment, selector))
}

/// First digit run that looks like an international-leaning phone number with
/// at least seven digits.
fn first_phone(text: &str) -> Option<String> {
    PHONE_RE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .find(|candidate| digit_count(candidate) >= 7)
}

fn website_url(fragment: &Html, text: &str) -> Option<String> {
    WEBSITE_SELECTORS
        .iter()
        .find_map(|selector| select_first_href(fragment, selector))
        .or_else(|| {
            URL_RE
                .find(text)
                .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', ')', '!']).to_string())
        })
}

fn place_url(fragment: &Html) -> Option<String> {
    select_first_href(fragment, PLACE_SELECTOR)
        .or_else(|| select_first_href(fragment, ANY_LINK_SELECTOR))
}

fn is_rating_line(line: &str) -> bool {
    RATING_RE.is_match(line) || line.to_lowercase().contains("review")
}

fn is_hours_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.starts_with("open") || lower.starts_with("closed") || lower.contains("hours")
}

fn is_call_line(line: &str) -> bool {
    line.to_lowercase().starts_with("call")
}

/// Street-type token and a digit run together mark an address-looking line.
fn looks_like_address(line: &str) -> bool {
    if !DIGIT_RUN_RE.is_match(line) {
        return false;
    }
    line.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| STREET_TOKENS.contains(&word))
}

fn category_and_address(
    lines: &[String],
    name: &str,
    phone: Option<&str>,
    text: &str,
) -> (Option<String>, Option<String>) {
    // Explicit labels win over any positional guess.
    let labeled_category = CATEGORY_LABEL_RE
        .captures(text)
        .map(|c| c[1].trim().to_string());
    let labeled_address = ADDRESS_LABEL_RE
        .captures(text)
        .map(|c| c[1].trim().to_string());

    let phone_line = |line: &str| phone.map(|p| line.contains(p)).unwrap_or(false);

    let category = labeled_category.or_else(|| {
        lines
            .iter()
            .filter(|line| line.as_str() != name)
            .find(|line| {
                !phone_line(line)
                    && !is_rating_line(line)
                    && !is_hours_line(line)
                    && !is_call_line(line)
                    && !looks_like_address(line)
                    && !line.contains(':')
            })
            .cloned()
    });

    let address = labeled_address.or_else(|| {
        lines
            .iter()
            .filter(|line| line.as_str() != name)
            .find(|line| {
                !is_rating_line(line)
                    && !is_call_line(line)
                    && Some(line.as_str()) != category.as_deref()
                    && looks_like_address(line)
            })
            .cloned()
    });

    let address = address.map(|a| clean_address(&a, category.as_deref()));
    (category, address)
}

/// Strip category fragments and separator glyphs that Maps folds into the
/// address segment of a card.
fn clean_address(address: &str, category: Option<&str>) -> String {
    let mut cleaned = address.trim().to_string();

    // Compound "Category · 123 Main St" strings keep only the rightmost
    // segment when the left one reads like a category.
    if cleaned.contains('·') {
        let segments: Vec<&str> = cleaned.split('·').map(str::trim).collect();
        if segments.len() > 1 {
            let left = segments[0].to_lowercase();
            let left_is_category = !DIGIT_RUN_RE.is_match(&left)
                && (CATEGORY_PREFIXES.iter().any(|p| left.contains(p)) || left.len() < 40);
            if left_is_category {
                if let Some(last) = segments.last() {
                    cleaned = (*last).to_string();
                }
            }
        }
    }

    for prefix in CATEGORY_PREFIXES {
        if let Some(rest) = strip_prefix_ignore_case(&cleaned, prefix) {
            cleaned = rest;
            break;
        }
    }

    if let Some(category) = category {
        if let Some(rest) = strip_prefix_ignore_case(&cleaned, category) {
            cleaned = rest;
        }
    }

    cleaned
        .trim_start_matches(|c: char| {
            c.is_whitespace() || matches!(c, '·' | '•' | '-' | '–' | '—' | ',' | ':')
        })
        .trim()
        .to_string()
}

/// ASCII case-insensitive prefix strip that never splits a UTF-8 boundary.
fn strip_prefix_ignore_case(text: &str, prefix: &str) -> Option<String> {
    if prefix.is_empty() {
        return None;
    }
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(text[prefix.len()..].to_string())
    } else {
        None
    }
}
