//! Wire types for the Easel bridge
//!
//! Defines the payloads exchanged between the canvas frontend, the relay
//! server, and the pipeline node adapters, plus the value-range rules both
//! sides apply to prompt parameters.

use serde::{Deserialize, Serialize};

/// Largest seed value accepted by the bridge; larger inputs saturate here.
pub const MAX_SEED: u64 = 999_999_999_999_999;

/// Strength applied when the frontend has not supplied one.
pub const DEFAULT_STRENGTH: f32 = 1.0;

/// Seed applied when the frontend has not supplied one.
pub const DEFAULT_SEED: u64 = 0;

/// Clamp a strength value into the 0..=1 range.
///
/// Callers are expected to reject non-finite values before storing; this
/// helper only enforces the range law.
pub fn clamp_strength(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Clamp a (possibly negative) seed into 0..=[`MAX_SEED`].
pub fn clamp_seed(value: i64) -> u64 {
    if value < 0 {
        0
    } else {
        (value as u64).min(MAX_SEED)
    }
}

/// Strip the `data:image/png;base64,` style prefix browsers prepend to
/// canvas exports, leaving the raw base64 payload.
pub fn strip_data_url_prefix(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, rest)) => rest,
        None => payload,
    }
}

// ============================================================================
// Prompt Types
// ============================================================================

/// The prompt parameters travelling alongside the canvas image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptBundle {
    pub prompt: String,
    pub negative: String,
    pub strength: f32,
    pub seed: u64,
}

impl Default for PromptBundle {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative: String::new(),
            strength: DEFAULT_STRENGTH,
            seed: DEFAULT_SEED,
        }
    }
}

impl PromptBundle {
    /// True while every field still carries its initial default, meaning
    /// the frontend has not submitted anything yet.
    pub fn is_default(&self) -> bool {
        self.prompt.is_empty()
            && self.negative.is_empty()
            && self.strength == DEFAULT_STRENGTH
            && self.seed == DEFAULT_SEED
    }
}

// ============================================================================
// Request Types
// ============================================================================

/// JSON form of an input push. The multipart form carries the same fields
/// with the image under a `file` part instead of `image_base64`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushInputRequest {
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub negative: Option<String>,
    #[serde(default)]
    pub strength: Option<f32>,
    /// Signed on the wire so out-of-range submissions can be clamped
    /// instead of rejected.
    #[serde(default)]
    pub seed: Option<i64>,
}

/// JSON form of an output push.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushOutputRequest {
    #[serde(default)]
    pub image_base64: Option<String>,
}

// ============================================================================
// Response Types
// ============================================================================

/// Acknowledgement for push operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushAck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_counter: Option<u64>,
}

/// Liveness report for the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub url: String,
    pub has_input: bool,
    pub has_output: bool,
    pub generation_counter: u64,
    pub ts: f64,
}

/// Error body returned by failing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_strength_range() {
        assert_eq!(clamp_strength(-5.0), 0.0);
        assert_eq!(clamp_strength(0.5), 0.5);
        assert_eq!(clamp_strength(5.0), 1.0);
    }

    #[test]
    fn test_clamp_seed_range() {
        assert_eq!(clamp_seed(-3), 0);
        assert_eq!(clamp_seed(42), 42);
        assert_eq!(clamp_seed(2_000_000_000_000_000), MAX_SEED);
    }

    #[test]
    fn test_strip_data_url_prefix() {
        assert_eq!(strip_data_url_prefix("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url_prefix("AAAA"), "AAAA");
    }

    #[test]
    fn test_prompt_bundle_default_detection() {
        let mut bundle = PromptBundle::default();
        assert!(bundle.is_default());

        bundle.prompt = "cat".into();
        assert!(!bundle.is_default());

        let mut bundle = PromptBundle::default();
        bundle.strength = 0.7;
        assert!(!bundle.is_default());

        let mut bundle = PromptBundle::default();
        bundle.seed = 42;
        assert!(!bundle.is_default());
    }

    #[test]
    fn test_push_input_request_partial_json() {
        let req: PushInputRequest = serde_json::from_str(r#"{"prompt": "cat"}"#).unwrap();
        assert_eq!(req.prompt.as_deref(), Some("cat"));
        assert!(req.image_base64.is_none());
        assert!(req.seed.is_none());
    }
}
