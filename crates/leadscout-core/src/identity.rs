//! Identity keys: the derived strings that collapse repeated observations of
//! one real-world business into one lead.
//!
//! The dedupe cache (intra-run) and the persistence store (cross-run) both
//! call into this module, so the two identity concepts cannot drift.

use url::Url;

use crate::LeadCandidate;

/// All identity keys a candidate carries, in priority order:
/// email, phone, website, then source-URL host+path. Each key is prefixed so
/// a phone number can never collide with a website string.
pub fn identity_keys(lead: &LeadCandidate) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(email) = non_empty(lead.email.as_deref()) {
        keys.push(format!("email:{}", email.to_lowercase()));
    }
    if let Some(phone) = lead.phone.as_deref() {
        let digits = phone_digits(phone);
        if !digits.is_empty() {
            keys.push(format!("phone:{digits}"));
        }
    }
    if let Some(website) = non_empty(lead.website.as_deref()) {
        keys.push(format!("web:{}", normalize_website(website)));
    }
    if let Some(source_url) = non_empty(lead.source_url.as_deref()) {
        if let Some(key) = source_url_key(source_url) {
            keys.push(format!("src:{key}"));
        }
    }
    keys
}

/// The primary identity key: first non-empty key in priority order, or `None`
/// for a candidate with no identifiable contact channel at all.
pub fn identity_key(lead: &LeadCandidate) -> Option<String> {
    identity_keys(lead).into_iter().next()
}

/// Count of digit characters, used to validate phone-looking strings.
pub fn digit_count(text: &str) -> usize {
    text.chars().filter(|c| c.is_ascii_digit()).count()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn phone_digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn normalize_website(website: &str) -> String {
    website.trim().to_lowercase().trim_end_matches('/').to_string()
}

fn source_url_key(source_url: &str) -> Option<String> {
    let parsed = Url::parse(source_url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let path = parsed.path().trim_end_matches('/');
    Some(format!("{host}{path}"))
}
