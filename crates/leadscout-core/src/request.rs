//! Typed search-request configuration, built from untyped JSON at the boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub categories: Vec<String>,
    pub must_have_email: bool,
    pub must_have_phone: bool,
    pub custom: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: Option<u32>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4.1-mini".into(),
            base_url: None,
            api_key: None,
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub sqlite_path: Option<String>,
    pub json_export: bool,
    pub json_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: Some("./data/lead_search.db".into()),
            json_export: false,
            json_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub anti_detection: bool,
    pub capture_screenshots: bool,
    pub use_llm_extraction: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            anti_detection: true,
            capture_screenshots: false,
            use_llm_extraction: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub keywords: Vec<String>,
    pub locations: Vec<String>,
    pub vertical: Option<String>,
    pub filters: SearchFilters,
    pub sources: Vec<String>,
    pub max_results: usize,
    pub pages_per_source: u32,
    pub timeout_seconds: u64,
    pub llm: LlmSettings,
    pub storage: StorageConfig,
    pub features: FeatureFlags,
    pub passthrough: Value,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            locations: Vec::new(),
            vertical: None,
            filters: SearchFilters::default(),
            sources: vec!["google_maps".into()],
            max_results: 50,
            pages_per_source: 3,
            timeout_seconds: 30,
            llm: LlmSettings::default(),
            storage: StorageConfig::default(),
            features: FeatureFlags::default(),
            passthrough: Value::Null,
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn opt_string(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(ToString::to_string)
}

impl SearchRequest {
    /// Build from a flexible JSON payload. Unknown fields are ignored and
    /// every missing field falls back to its default; this never fails.
    pub fn from_payload(payload: &Value) -> Self {
        let defaults = Self::default();

        let filters_payload = payload.get("filters").cloned().unwrap_or(Value::Null);
        let filters = SearchFilters {
            categories: string_list(filters_payload.get("categories")),
            must_have_email: filters_payload
                .get("must_have_email")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            must_have_phone: filters_payload
                .get("must_have_phone")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            custom: filters_payload
                .as_object()
                .map(|obj| {
                    obj.iter()
                        .filter(|(k, _)| {
                            !matches!(
                                k.as_str(),
                                "categories" | "must_have_email" | "must_have_phone"
                            )
                        })
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                })
                .unwrap_or_default(),
        };

        let llm_payload = payload.get("llm").cloned().unwrap_or(Value::Null);
        let llm = LlmSettings {
            provider: opt_string(llm_payload.get("provider")).unwrap_or(defaults.llm.provider),
            model: opt_string(llm_payload.get("model")).unwrap_or(defaults.llm.model),
            base_url: opt_string(llm_payload.get("base_url")),
            api_key: opt_string(llm_payload.get("api_key")),
            temperature: llm_payload
                .get("temperature")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            top_p: llm_payload.get("top_p").and_then(Value::as_f64).unwrap_or(1.0),
            max_tokens: llm_payload
                .get("max_tokens")
                .and_then(Value::as_u64)
                .map(|v| v as u32),
        };

        let storage = match payload.get("storage") {
            Some(Value::Object(obj)) => StorageConfig {
                sqlite_path: obj.get("sqlite_path").and_then(Value::as_str).map(Into::into),
                json_export: obj.get("json_export").and_then(Value::as_bool).unwrap_or(false),
                json_path: obj.get("json_path").and_then(Value::as_str).map(Into::into),
            },
            _ => defaults.storage,
        };

        let features = match payload.get("features") {
            Some(Value::Object(obj)) => FeatureFlags {
                anti_detection: obj
                    .get("anti_detection")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
                capture_screenshots: obj
                    .get("capture_screenshots")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                use_llm_extraction: obj
                    .get("use_llm_extraction")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            _ => defaults.features,
        };

        let sources = {
            let parsed = string_list(payload.get("sources"));
            if parsed.is_empty() {
                defaults.sources
            } else {
                parsed
            }
        };

        Self {
            keywords: string_list(payload.get("keywords")),
            locations: string_list(payload.get("locations")),
            vertical: opt_string(payload.get("vertical")),
            filters,
            sources,
            max_results: payload
                .get("max_results")
                .and_then(Value::as_u64)
                .unwrap_or(50) as usize,
            pages_per_source: payload
                .get("pages_per_source")
                .and_then(Value::as_u64)
                .unwrap_or(3) as u32,
            timeout_seconds: payload
                .get("timeout_seconds")
                .and_then(Value::as_u64)
                .unwrap_or(30),
            llm,
            storage,
            features,
            passthrough: payload.get("passthrough").cloned().unwrap_or(Value::Null),
        }
    }

    /// Normalized JSON snapshot of the search input. Object keys serialize in
    /// sorted order, so the same logical request always yields the same bytes
    /// (the persistence fingerprint hashes this string).
    pub fn snapshot_json(&self) -> String {
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_defaults_are_applied() {
        let request = SearchRequest::from_payload(&json!({}));
        assert!(request.keywords.is_empty());
        assert_eq!(request.sources, vec!["google_maps".to_string()]);
        assert_eq!(request.max_results, 50);
        assert_eq!(request.pages_per_source, 3);
        assert_eq!(request.storage.sqlite_path.as_deref(), Some("./data/lead_search.db"));
        assert!(request.features.anti_detection);
        assert!(!request.features.use_llm_extraction);
    }

    #[test]
    fn payload_extra_fields_are_ignored_and_custom_filters_kept() {
        let request = SearchRequest::from_payload(&json!({
            "keywords": ["plumber"],
            "filters": {"must_have_phone": true, "min_rating": 4.5},
            "unknown_top_level": {"a": 1},
        }));
        assert_eq!(request.keywords, vec!["plumber".to_string()]);
        assert!(request.filters.must_have_phone);
        assert_eq!(
            request.filters.custom.get("min_rating"),
            Some(&json!(4.5))
        );
    }

    #[test]
    fn snapshot_json_is_deterministic() {
        let a = SearchRequest::from_payload(&json!({"keywords": ["a"], "locations": ["x"]}));
        let b = SearchRequest::from_payload(&json!({"locations": ["x"], "keywords": ["a"]}));
        assert_eq!(a.snapshot_json(), b.snapshot_json());
    }
}
