//! Request telemetry
//!
//! `StandardLoggingPayload` is the stable shape callers can hang
//! dashboards/alerts off of. Unlike a freeform
//! `Sanitization::mask_sensitive_data` (which regex-scrubs arbitrary log
//! strings), this module only ever redacts fields it controls directly —
//! there's no raw log text to scrub here, so masking is a couple of direct
//! field transforms rather than a regex pass (documented as a deliberate
//! simplification in `DESIGN.md`).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Provider-facing details that aren't part of the normalized response body
/// but are still worth surfacing on the payload, e.g. rate-limit headers a
/// provider echoed back. Populated opportunistically: per-provider wire
/// translation is out of this crate's scope, so this is usually empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HiddenParams {
    pub additional_headers: HashMap<String, String>,
}

/// Bit-stable logging payload emitted once per completed (or failed)
/// request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardLoggingPayload {
    pub request_id: String,
    pub model_group: String,
    pub deployment_id: Option<String>,
    pub api_key_masked: Option<String>,
    pub status: String,
    pub duration_ms: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cache_hit: bool,
    pub error: Option<String>,
    /// The request's messages/input, redacted to a sentinel value when
    /// `turn_off_message_logging` is set.
    pub messages: Value,
    /// The provider's normalized response body, redacted the same way as
    /// `messages`.
    pub response: Value,
    pub hidden_params: HiddenParams,
    /// Per-candidate selection scores, when the latency strategy ran, omitted when empty.
    /// Distinct from the `turn_off_message_logging` toggle: this always
    /// publishes, since it carries scoring/debugging data rather than
    /// request/response content.
    pub model_map_information: Option<Value>,
}

/// Mask an API key to its last 4 characters, following the
/// `mask_sensitive_data` convention for credential-shaped values.
pub fn mask_api_key(key: &str) -> String {
    if key.len() <= 4 {
        "****".to_string()
    } else {
        format!("{}{}", "*".repeat(key.len() - 4), &key[key.len() - 4..])
    }
}

/// In-process publish/subscribe bus for [`StandardLoggingPayload`]s, letting
/// multiple consumers (metrics exporters, audit sinks) observe the same
/// request lifecycle events without the router depending on any of them
/// directly.
#[derive(Clone)]
pub struct TelemetryBus {
    sender: Arc<broadcast::Sender<StandardLoggingPayload>>,
    turn_off_message_logging: bool,
}

impl TelemetryBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
            turn_off_message_logging: false,
        }
    }

    pub fn with_message_logging_disabled(mut self, disabled: bool) -> Self {
        self.turn_off_message_logging = disabled;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StandardLoggingPayload> {
        self.sender.subscribe()
    }

    /// Publish a payload, applying redaction rules before it leaves the
    /// router.
    pub fn publish(&self, mut payload: StandardLoggingPayload) {
        if self.turn_off_message_logging {
            payload.messages = json!("redacted-by-litellm");
            payload.response = json!({"text": "redacted-by-litellm"});
        }
        if let Some(key) = &payload.api_key_masked {
            payload.api_key_masked = Some(mask_api_key(key));
        }

        info!(
            request_id = %payload.request_id,
            model_group = %payload.model_group,
            status = %payload.status,
            duration_ms = payload.duration_ms,
            cache_hit = payload.cache_hit,
            "request completed"
        );

        // No active subscribers is normal (telemetry is opt-in), not an
        // error worth logging loudly.
        if self.sender.send(payload).is_err() {
            debug!("telemetry published with no active subscribers");
        }
    }
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> StandardLoggingPayload {
        StandardLoggingPayload {
            request_id: "req-1".into(),
            model_group: "gpt-4".into(),
            deployment_id: Some("d1".into()),
            api_key_masked: Some("sk-abcdefgh1234".into()),
            status: "success".into(),
            duration_ms: 120,
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            cache_hit: false,
            error: None,
            messages: serde_json::json!([{"role": "user", "content": "hi"}]),
            response: serde_json::json!({"text": "hello"}),
            hidden_params: HiddenParams::default(),
            model_map_information: Some(serde_json::json!({"d1": {"latency": 0.1}})),
        }
    }

    #[test]
    fn masking_keeps_last_four_chars() {
        assert_eq!(mask_api_key("sk-abcdefgh1234"), "**********1234");
    }

    #[test]
    fn short_keys_fully_masked() {
        assert_eq!(mask_api_key("ab"), "****");
    }

    #[tokio::test]
    async fn subscribers_receive_published_payload() {
        let bus = TelemetryBus::default();
        let mut rx = bus.subscribe();
        bus.publish(payload());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.request_id, "req-1");
        assert_eq!(received.api_key_masked.as_deref(), Some("**********1234"));
    }

    #[tokio::test]
    async fn message_logging_disabled_redacts_messages_and_response() {
        let bus = TelemetryBus::default().with_message_logging_disabled(true);
        let mut rx = bus.subscribe();
        bus.publish(payload());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.messages, serde_json::json!("redacted-by-litellm"));
        assert_eq!(received.response, serde_json::json!({"text": "redacted-by-litellm"}));
    }

    #[tokio::test]
    async fn message_logging_disabled_does_not_strip_model_map_information() {
        // model_map_information is scoring/debugging data, not request/
        // response content; turn_off_message_logging must not touch it.
        let bus = TelemetryBus::default().with_message_logging_disabled(true);
        let mut rx = bus.subscribe();
        bus.publish(payload());
        let received = rx.recv().await.unwrap();
        assert!(received.model_map_information.is_some());
    }
}
