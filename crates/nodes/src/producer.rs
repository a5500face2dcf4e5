//! Producer node: pulls the latest canvas and prompt into the graph

use std::time::{Duration, Instant};

use easel_api::{clamp_strength, PromptBundle, MAX_SEED};
use tracing::warn;

use crate::client::BridgeClient;
use crate::tensor::ImageTensor;

/// Bounded wait requested from the relay per fetch attempt.
const WAIT_SLICE: Duration = Duration::from_secs(2);

/// Pause before retrying after a transport error.
const RETRY_DELAY: Duration = Duration::from_millis(120);

/// What the producer emits into the pipeline graph.
#[derive(Debug, Clone)]
pub struct CanvasFrame {
    pub tensor: ImageTensor,
    pub bundle: PromptBundle,
}

/// Graph node that pulls the latest editor canvas, prompt text, negative
/// prompt, strength, and seed from the relay.
pub struct CanvasInput {
    client: BridgeClient,
}

impl CanvasInput {
    pub fn new(client: BridgeClient) -> Self {
        Self { client }
    }

    /// Pull a frame, waiting up to `timeout` for input to appear when
    /// `wait_for_image` is set.
    ///
    /// This never fails: if no image can be obtained before the deadline
    /// (or immediately, when waiting is disabled) the frame carries a
    /// blank placeholder so the graph stays runnable. The prompt fetch is
    /// one best-effort attempt; on failure the defaults stand.
    pub async fn pull(&self, wait_for_image: bool, timeout: Duration) -> CanvasFrame {
        let tensor = match self.fetch_image(wait_for_image, timeout).await {
            Some(bytes) => ImageTensor::from_encoded(&bytes).unwrap_or_else(|err| {
                warn!("Discarding undecodable input image: {err}");
                ImageTensor::placeholder()
            }),
            None => ImageTensor::placeholder(),
        };

        let mut bundle = PromptBundle::default();
        match self.client.fetch_prompt().await {
            Ok(Some(fetched)) => bundle = sanitize_bundle(fetched, &bundle),
            Ok(None) => {}
            Err(err) => warn!("Prompt fetch failed, keeping defaults: {err}"),
        }

        CanvasFrame { tensor, bundle }
    }

    async fn fetch_image(&self, wait_for_image: bool, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let wait = wait_for_image.then(|| remaining.min(WAIT_SLICE));

            match self.client.fetch_input(wait).await {
                Ok(Some(bytes)) => return Some(bytes),
                Ok(None) if !wait_for_image => return None,
                Ok(None) => {}
                Err(err) => {
                    warn!("Input fetch failed: {err}");
                    if !wait_for_image {
                        return None;
                    }
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }

            if Instant::now() >= deadline {
                return None;
            }
        }
    }
}

/// Apply the same range rules the relay enforces, in case the two ends
/// ever disagree about a stored value.
fn sanitize_bundle(fetched: PromptBundle, fallback: &PromptBundle) -> PromptBundle {
    PromptBundle {
        prompt: fetched.prompt,
        negative: fetched.negative,
        strength: if fetched.strength.is_finite() {
            clamp_strength(fetched.strength)
        } else {
            fallback.strength
        },
        seed: fetched.seed.min(MAX_SEED),
    }
}
