//! Query builders turning a search request into scrape strategy steps.

use leadscout_core::{SearchRequest, StrategyStep};

/// Dispatch to source-specific strategy builders. Unknown sources contribute
/// no steps; the orchestrator reports nothing for them.
pub fn build_strategies(request: &SearchRequest) -> Vec<StrategyStep> {
    let mut steps = Vec::new();
    for source in &request.sources {
        if matches!(
            source.to_lowercase().as_str(),
            "google_maps" | "maps" | "google-maps"
        ) {
            steps.extend(build_google_maps_strategies(request));
        }
    }
    steps
}

/// One step per keyword x location x page for Google Maps.
pub fn build_google_maps_strategies(request: &SearchRequest) -> Vec<StrategyStep> {
    let mut steps = Vec::new();
    if request.keywords.is_empty() {
        return steps;
    }

    let locations: Vec<Option<&str>> = if request.locations.is_empty() {
        vec![None]
    } else {
        request.locations.iter().map(|l| Some(l.as_str())).collect()
    };
    let max_pages = request.pages_per_source.max(1);

    for keyword in &request.keywords {
        for location in &locations {
            let query = match location {
                Some(loc) => format!("{keyword} {loc}"),
                None => keyword.clone(),
            };
            for page in 1..=max_pages {
                steps.push(StrategyStep {
                    source: "google_maps".into(),
                    query: query.clone(),
                    location: location.map(ToString::to_string),
                    page,
                    max_pages,
                    throttle_seconds: 1.5,
                    parser_hint: Some("maps_listing".into()),
                    step_id: step_id("google_maps", &query, page),
                });
            }
        }
    }
    steps
}

/// Maps search URL with pagination. Maps offsets results by roughly a page
/// of 20; `start` approximates that.
pub fn maps_search_url(query: &str, page: u32) -> String {
    let start = page.saturating_sub(1) * 20;
    format!(
        "https://www.google.com/maps/search/{}?start={start}",
        urlencoding::encode(query)
    )
}

/// Stable step identifier so fixtures and artifacts correlate across runs.
fn step_id(source: &str, query: &str, page: u32) -> String {
    format!("{source}-{}-p{page}", slug(query))
}

fn slug(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
