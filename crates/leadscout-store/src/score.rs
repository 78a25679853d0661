//! Rule-based lead scoring with a human-readable rationale per lead.

use leadscout_core::{LeadCandidate, ScoredLead, SearchFilters};

const BASE_SCORE: f64 = 0.2;

/// Score each lead against the filters and sort by descending score.
/// Ties keep input order. Every score is clamped into `[0, 1]`.
pub fn score_leads(leads: Vec<LeadCandidate>, filters: &SearchFilters) -> Vec<ScoredLead> {
    let mut scored: Vec<ScoredLead> = leads
        .into_iter()
        .map(|lead| {
            let mut score = BASE_SCORE;
            let mut rationale = Vec::new();

            if lead.email.is_some() {
                score += 0.3;
                rationale.push("has_email");
            }
            if lead.phone.is_some() {
                score += 0.2;
                rationale.push("has_phone");
            }
            if let Some(category) = &lead.category {
                if filters
                    .categories
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(category))
                {
                    score += 0.2;
                    rationale.push("category_match");
                }
            }
            if filters.must_have_email && lead.email.is_none() {
                score -= 0.3;
                rationale.push("missing_required_email");
            }
            if filters.must_have_phone && lead.phone.is_none() {
                score -= 0.2;
                rationale.push("missing_required_phone");
            }

            let rationale = if rationale.is_empty() {
                "baseline".to_string()
            } else {
                rationale.join(", ")
            };
            ScoredLead {
                lead,
                score: score.clamp(0.0, 1.0),
                rationale,
            }
        })
        .collect();

    // Stable sort, so equal scores keep their input order.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}
