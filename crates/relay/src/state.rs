//! In-memory session state shared by every relay endpoint
//!
//! One [`SessionStore`] is constructed by the composition root and cloned
//! into each handler. A single mutex guards all fields; every read hands
//! out a copy, so in-flight responses are never invalidated by a
//! concurrent write. The lock is never held across an await point.

use std::sync::{Arc, Mutex};

use easel_api::{clamp_seed, clamp_strength, PromptBundle, DEFAULT_SEED, DEFAULT_STRENGTH};
use serde_json::{Map, Value};
use tokio::sync::watch;

/// Errors from session store mutations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no image data supplied")]
    EmptyImage,

    #[error("missing or invalid 'prompt' payload")]
    InvalidPayload,

    #[error("missing prompt (and no stored payload)")]
    MissingPayload,
}

/// Snapshot of everything the relay holds for the current session.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub input_image: Option<Vec<u8>>,
    pub output_image: Option<Vec<u8>>,
    pub prompt_text: String,
    pub negative_text: String,
    pub strength: f32,
    pub seed: u64,
    pub trigger_payload: Option<Map<String, Value>>,
    pub generation_counter: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            input_image: None,
            output_image: None,
            prompt_text: String::new(),
            negative_text: String::new(),
            strength: DEFAULT_STRENGTH,
            seed: DEFAULT_SEED,
            trigger_payload: None,
            generation_counter: 0,
        }
    }
}

impl SessionState {
    /// The prompt parameters as sent to the pipeline producer node.
    pub fn prompt_bundle(&self) -> PromptBundle {
        PromptBundle {
            prompt: self.prompt_text.clone(),
            negative: self.negative_text.clone(),
            strength: self.strength,
            seed: self.seed,
        }
    }
}

/// Fields carried by one input ingestion.
///
/// `image` is the decoded byte blob; the optional prompt fields are
/// last-write-wins and applied even when the image is absent.
#[derive(Debug, Default)]
pub struct InputUpdate {
    pub image: Option<Vec<u8>>,
    pub prompt: Option<String>,
    pub negative: Option<String>,
    pub strength: Option<f32>,
    pub seed: Option<i64>,
}

/// Handle to the process-wide session state.
///
/// Cheap to clone; all clones share the same state and generation signal.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<SessionState>>,
    generation: Arc<watch::Sender<u64>>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(SessionState::default())),
            generation: Arc::new(generation),
        }
    }

    /// Copy of the full session state.
    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    /// Subscribe to generation counter changes. The ingestion path signals
    /// this channel, so readers can await new input instead of polling.
    pub fn watch_generation(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    /// Apply an input ingestion.
    ///
    /// Supplied prompt fields always overwrite their previous values;
    /// numeric fields are clamped at write time. Only a non-empty image
    /// advances the generation counter. An empty or absent image leaves the
    /// stored image untouched and reports [`StoreError::EmptyImage`].
    pub fn set_input(&self, update: InputUpdate) -> Result<u64, StoreError> {
        let counter = {
            let mut state = self.lock();
            if let Some(prompt) = update.prompt {
                state.prompt_text = prompt;
            }
            if let Some(negative) = update.negative {
                state.negative_text = negative;
            }
            if let Some(strength) = update.strength {
                if strength.is_finite() {
                    state.strength = clamp_strength(strength);
                }
            }
            if let Some(seed) = update.seed {
                state.seed = clamp_seed(seed);
            }

            match update.image {
                Some(bytes) if !bytes.is_empty() => {
                    state.input_image = Some(bytes);
                    state.generation_counter += 1;
                    state.generation_counter
                }
                _ => return Err(StoreError::EmptyImage),
            }
        };
        self.generation.send_replace(counter);
        Ok(counter)
    }

    /// Store the latest output image. Empty bytes are rejected and leave
    /// the previous image in place.
    pub fn set_output(&self, bytes: Vec<u8>) -> Result<(), StoreError> {
        if bytes.is_empty() {
            return Err(StoreError::EmptyImage);
        }
        self.lock().output_image = Some(bytes);
        Ok(())
    }

    /// Store a trigger payload for later forwarding. Anything but a JSON
    /// object is rejected without touching the previously stored payload.
    pub fn set_trigger(&self, payload: Value) -> Result<(), StoreError> {
        match payload {
            Value::Object(map) => {
                self.lock().trigger_payload = Some(map);
                Ok(())
            }
            _ => Err(StoreError::InvalidPayload),
        }
    }

    /// Resolve the payload to forward: an explicit one wins, otherwise the
    /// stored one; an error when neither exists.
    pub fn trigger_payload_or(
        &self,
        explicit: Option<Map<String, Value>>,
    ) -> Result<Map<String, Value>, StoreError> {
        if let Some(payload) = explicit {
            return Ok(payload);
        }
        self.lock()
            .trigger_payload
            .clone()
            .ok_or(StoreError::MissingPayload)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        // A poisoned lock means a panic while holding it; the state is
        // plain data, so continuing with the last written values is safe.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
