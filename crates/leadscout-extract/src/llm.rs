//! Chat-completion transport seam and the LLM extraction path built on it.
//!
//! One provider/model per run, no auto-fallback. Any transport or parse
//! failure surfaces as a single error string; it never aborts extraction.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use leadscout_core::{LeadCandidate, LlmSettings};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
/// Page text is truncated to this many chars before being sent.
const PROMPT_TEXT_CAP: usize = 6000;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("chat request failed: {0}")]
    Request(String),
    #[error("chat response malformed: {0}")]
    Malformed(String),
}

/// Provider seam for chat completions. Implemented over HTTP in production
/// and by canned responders in tests.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn chat(
        &self,
        settings: &LlmSettings,
        messages: &[ChatMessage],
    ) -> Result<Value, TransportError>;
}

/// OpenAI-compatible chat endpoint over HTTP.
#[derive(Debug, Default)]
pub struct HttpChatTransport {
    client: reqwest::Client,
}

impl HttpChatTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn chat(
        &self,
        settings: &LlmSettings,
        messages: &[ChatMessage],
    ) -> Result<Value, TransportError> {
        let base = settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{}/v1/chat/completions", base.trim_end_matches('/'));

        let mut payload = json!({
            "model": settings.model,
            "messages": messages,
            "temperature": settings.temperature,
            "top_p": settings.top_p,
            "response_format": {"type": "json_object"},
        });
        if let Some(max_tokens) = settings.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }

        let mut request = self.client.post(&url).json(&payload);
        if let Some(api_key) = &settings.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TransportError::Request(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

/// Ask the model for a JSON list of lead objects in `text`. The response may
/// be a bare array or an object with a `leads` array; anything else is an
/// error string for the run log.
pub async fn llm_extract(
    text: &str,
    settings: &LlmSettings,
    transport: &dyn ChatTransport,
) -> Result<Vec<LeadCandidate>, String> {
    let truncated: String = text.chars().take(PROMPT_TEXT_CAP).collect();
    let messages = [
        ChatMessage::system("Extract lead details as a JSON list of objects."),
        ChatMessage::user(truncated),
    ];

    let response = transport
        .chat(settings, &messages)
        .await
        .map_err(|e| e.to_string())?;

    let content = response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .unwrap_or("");
    if content.is_empty() {
        return Err("llm extraction: response carried no message content".into());
    }

    let data: Value = serde_json::from_str(content)
        .map_err(|e| format!("llm extraction: content is not JSON: {e}"))?;
    let items = match &data {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("leads")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    let mut leads = Vec::new();
    for item in items {
        let Value::Object(fields) = item else {
            continue;
        };
        let field = |key: &str| fields.get(key).and_then(Value::as_str).map(ToString::to_string);

        let mut lead = LeadCandidate::named(
            field("company_name").unwrap_or_else(|| "Unknown".to_string()),
        );
        lead.website = field("website");
        lead.phone = field("phone");
        lead.email = field("email");
        lead.address = field("address");
        lead.category = field("category");
        lead.contact_name = field("contact_name");
        lead.contact_title = field("contact_title");
        lead.confidence = fields
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.6)
            .clamp(0.0, 1.0);
        lead.source_url = field("source_url");
        lead.source = field("source");
        leads.push(lead);
    }
    Ok(leads)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedTransport {
        content: Option<String>,
        fail: bool,
    }

    impl CannedTransport {
        fn replying(content: &str) -> Self {
            Self {
                content: Some(content.to_string()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl ChatTransport for CannedTransport {
        async fn chat(
            &self,
            _settings: &LlmSettings,
            _messages: &[ChatMessage],
        ) -> Result<Value, TransportError> {
            if self.fail {
                return Err(TransportError::Request("connection refused".into()));
            }
            Ok(json!({
                "choices": [{
                    "message": {"content": self.content.clone().unwrap_or_default()}
                }]
            }))
        }
    }

    #[tokio::test]
    async fn parses_object_with_leads_array() {
        let transport = CannedTransport::replying(
            r#"{"leads": [{"company_name": "Acme Plumbing", "email": "info@acme.example", "confidence": 0.9}]}"#,
        );
        let leads = llm_extract("page text", &LlmSettings::default(), &transport)
            .await
            .unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].company_name, "Acme Plumbing");
        assert_eq!(leads[0].email.as_deref(), Some("info@acme.example"));
        assert_eq!(leads[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn parses_bare_array_and_defaults_missing_fields() {
        let transport = CannedTransport::replying(r#"[{"phone": "+1 555 000 1111"}, 42]"#);
        let leads = llm_extract("page text", &LlmSettings::default(), &transport)
            .await
            .unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].company_name, "Unknown");
        assert_eq!(leads[0].confidence, 0.6);
    }

    #[tokio::test]
    async fn malformed_content_is_an_error_string() {
        let transport = CannedTransport::replying("not json at all");
        let err = llm_extract("page text", &LlmSettings::default(), &transport)
            .await
            .unwrap_err();
        assert!(err.contains("not JSON"));
    }

    #[tokio::test]
    async fn transport_failure_is_an_error_string() {
        let transport = CannedTransport {
            content: None,
            fail: true,
        };
        let err = llm_extract("page text", &LlmSettings::default(), &transport)
            .await
            .unwrap_err();
        assert!(err.contains("connection refused"));
    }
}
