//! Anti-detection knobs: delays, user agent, viewport, retry budget.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Immutable anti-detection configuration. Built from an untyped input map at
/// the boundary; the core only ever sees named, defaulted fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiDetectionConfig {
    pub enabled: bool,
    pub user_agent: String,
    pub viewport: Viewport,
    pub stealth: bool,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub render_wait_ms: u64,
    pub max_retries: u32,
    pub headless: bool,
    pub proxy: Option<String>,
    pub timeout_ms: u64,
}

impl Default for AntiDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_agent: DEFAULT_USER_AGENT.into(),
            viewport: Viewport {
                width: 1366,
                height: 768,
            },
            stealth: true,
            min_delay_ms: 400,
            max_delay_ms: 1200,
            render_wait_ms: 1500,
            max_retries: 2,
            headless: true,
            proxy: None,
            timeout_ms: 30_000,
        }
    }
}

impl AntiDetectionConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            min_delay_ms: 0,
            max_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Build from a loose JSON map. Missing or mistyped fields keep their
    /// defaults; an `{"enabled": false}` blob yields the disabled config.
    pub fn from_payload(payload: &Value) -> Self {
        let defaults = Self::default();
        if !payload
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(true)
        {
            return Self::disabled();
        }

        let u64_field = |key: &str, fallback: u64| -> u64 {
            payload.get(key).and_then(Value::as_u64).unwrap_or(fallback)
        };

        Self {
            enabled: true,
            user_agent: payload
                .get("user_agent")
                .and_then(Value::as_str)
                .map(Into::into)
                .unwrap_or(defaults.user_agent),
            viewport: payload
                .get("viewport")
                .map(|v| Viewport {
                    width: v.get("width").and_then(Value::as_u64).unwrap_or(1366) as u32,
                    height: v.get("height").and_then(Value::as_u64).unwrap_or(768) as u32,
                })
                .unwrap_or(defaults.viewport),
            stealth: payload
                .get("stealth")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            min_delay_ms: u64_field("min_delay_ms", defaults.min_delay_ms),
            max_delay_ms: u64_field("max_delay_ms", defaults.max_delay_ms),
            render_wait_ms: u64_field("render_wait_ms", defaults.render_wait_ms),
            max_retries: u64_field("max_retries", u64::from(defaults.max_retries)) as u32,
            headless: payload
                .get("headless")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            proxy: payload
                .get("proxy")
                .and_then(Value::as_str)
                .map(Into::into),
            timeout_ms: u64_field("timeout_ms", defaults.timeout_ms),
        }
    }

    /// Randomized pre-navigation pause, bounded by the configured window.
    pub fn pre_navigation_delay(&self) -> Duration {
        if !self.enabled || self.max_delay_ms == 0 {
            return Duration::ZERO;
        }
        let low = self.min_delay_ms.min(self.max_delay_ms);
        let high = self.max_delay_ms.max(self.min_delay_ms);
        let millis = if low == high {
            low
        } else {
            rand::thread_rng().gen_range(low..=high)
        };
        Duration::from_millis(millis)
    }

    /// Retry budget is always at least one attempt.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}
