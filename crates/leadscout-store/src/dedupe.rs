//! Intra-run dedupe: collapses candidates that share any identity key.

use std::collections::HashSet;

use leadscout_core::identity::identity_keys;
use leadscout_core::{CacheStats, LeadCandidate};

/// Keep the first occurrence of each identity, preserving input order.
///
/// A candidate is dropped when **any** of its keys was already seen, not just
/// its primary one. Two leads sharing only a phone number collapse to one
/// even if their emails differ; a candidate with no keys is always kept.
pub fn dedupe_leads(leads: Vec<LeadCandidate>) -> (Vec<LeadCandidate>, CacheStats) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(leads.len());
    let mut hits = 0;

    for lead in leads {
        let keys = identity_keys(&lead);
        if keys.iter().any(|key| seen.contains(key)) {
            hits += 1;
            continue;
        }
        seen.extend(keys);
        kept.push(lead);
    }

    let stats = CacheStats {
        hits,
        deduped: hits,
        kept: kept.len(),
    };
    (kept, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(name: &str) -> LeadCandidate {
        LeadCandidate::named(name)
    }

    #[test]
    fn duplicate_emails_collapse_case_insensitively() {
        let mut a = lead("First");
        a.email = Some("a@x.com".into());
        let mut b = lead("Second");
        b.email = Some("A@X.COM".into());

        let (kept, stats) = dedupe_leads(vec![a, b]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].company_name, "First");
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.deduped, 1);
        assert_eq!(stats.kept, 1);
    }

    #[test]
    fn any_shared_key_merges_even_with_distinct_emails() {
        let mut a = lead("A");
        a.email = Some("a@x.com".into());
        a.phone = Some("+1 206 555 0100".into());
        let mut b = lead("B");
        b.email = Some("b@y.com".into());
        b.phone = Some("+1 (206) 555-0100".into());

        let (kept, stats) = dedupe_leads(vec![a, b]);
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn keyless_candidates_are_never_duplicates() {
        let (kept, stats) = dedupe_leads(vec![lead("X"), lead("X"), lead("X")]);
        assert_eq!(kept.len(), 3);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.kept, 3);
    }

    #[test]
    fn first_seen_order_is_preserved() {
        let mut a = lead("A");
        a.website = Some("https://one.example".into());
        let b = lead("B");
        let mut c = lead("C");
        c.website = Some("https://one.example/".into());
        let mut d = lead("D");
        d.website = Some("https://two.example".into());

        let (kept, stats) = dedupe_leads(vec![a, b, c, d]);
        let names: Vec<&str> = kept.iter().map(|l| l.company_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "D"]);
        assert_eq!(stats.hits, 1);
    }
}
