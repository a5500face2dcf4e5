//! HTTP surface of the relay
//!
//! Ingestion endpoints accept the canvas image and prompt parameters from
//! the browser (multipart upload or base64 JSON, both normalized into the
//! same byte blob), retrieval endpoints hand the current state to the
//! pipeline nodes and the browser, and `/trigger` relays a graph submission
//! to the pipeline host. Everything below `/` that is not an API route is
//! served from the frontend bundle.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::body::{to_bytes, Bytes};
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use easel_api::{
    strip_data_url_prefix, PushAck, PushInputRequest, PushOutputRequest, StatusResponse,
};
use easel_config::BridgeConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::forward::{forward_payload, ForwardQueue};
use crate::state::{InputUpdate, SessionStore};

/// Largest request body the ingestion endpoints accept.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Upper bound on the `wait_ms` long-poll parameter.
const MAX_WAIT_MS: u64 = 120_000;

/// Delay between the shutdown acknowledgement and process termination,
/// long enough for the response to flush.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Everything the handlers need, owned by the composition root.
#[derive(Clone)]
pub struct AppState {
    pub store: SessionStore,
    pub config: Arc<BridgeConfig>,
    pub client: reqwest::Client,
    pub forwarder: Option<ForwardQueue>,
    pub shutdown: CancellationToken,
}

// ─── Router ─────────────────────────────────────────────────────────────────

pub fn app_router(state: AppState) -> Router {
    let frontend_dir = state.config.frontend_dir.clone();
    let index = frontend_dir.join("index.html");
    let frontend = ServeDir::new(&frontend_dir).fallback(ServeFile::new(index));

    Router::new()
        .route("/status", get(status))
        .route("/open", get(open_hint))
        .route("/push/input", post(push_input))
        .route("/get/input", get(get_input))
        .route("/get/prompt", get(get_prompt))
        .route("/push/output", post(push_output))
        .route("/get/output", get(get_output))
        .route("/store/trigger", post(store_trigger))
        .route("/trigger", post(trigger))
        .route("/shutdown", post(shutdown))
        .route("/debug/event", post(debug_event))
        .layer(CorsLayer::permissive())
        .fallback_service(frontend)
        .with_state(state)
}

// ─── Status ─────────────────────────────────────────────────────────────────

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.store.snapshot();
    Json(StatusResponse {
        ok: true,
        url: state.config.url(),
        has_input: snapshot.input_image.is_some(),
        has_output: snapshot.output_image.is_some(),
        generation_counter: snapshot.generation_counter,
        ts: unix_now(),
    })
}

async fn open_hint(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "url": state.config.url() }))
}

// ─── Input ingestion ────────────────────────────────────────────────────────

async fn push_input(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<PushAck>, RelayError> {
    let update = if is_multipart(&request) {
        parse_input_multipart(request).await?
    } else {
        parse_input_json(request).await?
    };

    let counter = state.store.set_input(update)?;
    debug!("Input image stored, counter={counter}");

    // Auto-forward fires on the background worker; the response is never
    // delayed by, or ordered against, the upstream call.
    if state.config.auto_forward {
        if let Some(queue) = &state.forwarder {
            if let Ok(payload) = state.store.trigger_payload_or(None) {
                queue.enqueue(payload);
            }
        }
    }

    Ok(Json(PushAck {
        ok: true,
        generation_counter: Some(counter),
    }))
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("multipart/form-data"))
        .unwrap_or(false)
}

async fn parse_input_multipart(request: Request) -> Result<InputUpdate, RelayError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|err| RelayError::BadRequest(format!("invalid multipart body: {err}")))?;

    let mut update = InputUpdate::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| RelayError::BadRequest(format!("invalid multipart field: {err}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| RelayError::BadRequest(format!("unreadable file field: {err}")))?;
                update.image = Some(bytes.to_vec());
            }
            "prompt" => update.prompt = Some(read_text_field(field).await?),
            "negative" => update.negative = Some(read_text_field(field).await?),
            "strength" => match read_text_field(field).await?.trim().parse::<f32>() {
                Ok(value) => update.strength = Some(value),
                Err(_) => warn!("Ignoring unparseable strength form field"),
            },
            "seed" => match read_text_field(field).await?.trim().parse::<i64>() {
                Ok(value) => update.seed = Some(value),
                Err(_) => warn!("Ignoring unparseable seed form field"),
            },
            other => debug!("Ignoring unknown form field {other:?}"),
        }
    }
    Ok(update)
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, RelayError> {
    field
        .text()
        .await
        .map_err(|err| RelayError::BadRequest(format!("unreadable form field: {err}")))
}

async fn parse_input_json(request: Request) -> Result<InputUpdate, RelayError> {
    let body = read_body(request).await?;
    let parsed: PushInputRequest = if body.is_empty() {
        PushInputRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| RelayError::BadRequest(format!("invalid JSON: {err}")))?
    };

    Ok(InputUpdate {
        image: decode_image_base64(parsed.image_base64.as_deref())?,
        prompt: parsed.prompt,
        negative: parsed.negative,
        strength: parsed.strength,
        seed: parsed.seed,
    })
}

/// Decode a base64 image payload, tolerating the data-URL prefix browsers
/// prepend to canvas exports. An empty payload is "no image", not an error.
fn decode_image_base64(payload: Option<&str>) -> Result<Option<Vec<u8>>, RelayError> {
    let Some(payload) = payload else {
        return Ok(None);
    };
    let raw = strip_data_url_prefix(payload);
    if raw.is_empty() {
        return Ok(None);
    }
    BASE64
        .decode(raw)
        .map(Some)
        .map_err(|err| RelayError::BadRequest(format!("invalid base64 image: {err}")))
}

async fn read_body(request: Request) -> Result<Bytes, RelayError> {
    to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|err| RelayError::BadRequest(format!("unreadable body: {err}")))
}

// ─── Input / prompt retrieval ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GetInputParams {
    /// Bounded wait for new input, in milliseconds. Absent means respond
    /// immediately with whatever is stored.
    wait_ms: Option<u64>,
}

async fn get_input(
    State(state): State<AppState>,
    Query(params): Query<GetInputParams>,
) -> Response {
    if let Some(bytes) = state.store.snapshot().input_image {
        return png_response(bytes);
    }

    // No image yet: wait on the ingestion signal instead of asking the
    // caller to poll on an interval.
    if let Some(wait_ms) = params.wait_ms.filter(|ms| *ms > 0) {
        let deadline = Instant::now() + Duration::from_millis(wait_ms.min(MAX_WAIT_MS));
        let mut generation = state.store.watch_generation();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, generation.changed()).await {
                Ok(Ok(())) => {
                    if let Some(bytes) = state.store.snapshot().input_image {
                        return png_response(bytes);
                    }
                }
                // Deadline elapsed or the store went away.
                _ => break,
            }
        }
    }

    StatusCode::NO_CONTENT.into_response()
}

async fn get_prompt(State(state): State<AppState>) -> Response {
    let bundle = state.store.snapshot().prompt_bundle();
    if bundle.is_default() {
        return StatusCode::NO_CONTENT.into_response();
    }
    Json(bundle).into_response()
}

// ─── Output ─────────────────────────────────────────────────────────────────

async fn push_output(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<PushAck>, RelayError> {
    let bytes = if is_multipart(&request) {
        parse_output_multipart(request).await?
    } else {
        let body = read_body(request).await?;
        let parsed: PushOutputRequest = if body.is_empty() {
            PushOutputRequest::default()
        } else {
            serde_json::from_slice(&body)
                .map_err(|err| RelayError::BadRequest(format!("invalid JSON: {err}")))?
        };
        decode_image_base64(parsed.image_base64.as_deref())?.unwrap_or_default()
    };

    let size = bytes.len();
    state.store.set_output(bytes)?;
    debug!("Output image updated, {} KB", size / 1024);

    if let Some(dir) = &state.config.dump_dir {
        let counter = state.store.snapshot().generation_counter;
        let path = dir.join(format!("output-{counter:06}.png"));
        let snapshot = state.store.snapshot().output_image.unwrap_or_default();
        if let Err(err) = tokio::fs::write(&path, snapshot).await {
            warn!("Failed to dump output image to {}: {err}", path.display());
        }
    }

    Ok(Json(PushAck {
        ok: true,
        generation_counter: None,
    }))
}

async fn parse_output_multipart(request: Request) -> Result<Vec<u8>, RelayError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|err| RelayError::BadRequest(format!("invalid multipart body: {err}")))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| RelayError::BadRequest(format!("invalid multipart field: {err}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| RelayError::BadRequest(format!("unreadable file field: {err}")))?;
            return Ok(bytes.to_vec());
        }
    }
    Ok(Vec::new())
}

async fn get_output(State(state): State<AppState>) -> Response {
    match state.store.snapshot().output_image {
        Some(bytes) => png_response(bytes),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

// ─── Trigger storage and forwarding ─────────────────────────────────────────

async fn store_trigger(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    let data: Value = serde_json::from_slice(&body)
        .map_err(|err| RelayError::BadRequest(format!("invalid JSON: {err}")))?;
    let payload = data.get("prompt").cloned().unwrap_or(Value::Null);

    let node_count = payload
        .get("prompt")
        .and_then(|graph| graph.as_object())
        .map(|graph| graph.len());
    state.store.set_trigger(payload)?;
    debug!("Stored trigger payload (nodes={node_count:?})");

    Ok(Json(json!({ "ok": true })))
}

async fn trigger(State(state): State<AppState>, body: Bytes) -> Result<Response, RelayError> {
    let explicit = if body.is_empty() {
        None
    } else {
        let data: Value = serde_json::from_slice(&body)
            .map_err(|err| RelayError::BadRequest(format!("invalid JSON: {err}")))?;
        match data.get("prompt") {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map.clone()),
            Some(_) => {
                return Err(RelayError::BadRequest(
                    "missing or invalid 'prompt'".to_string(),
                ))
            }
        }
    };

    let payload = state.store.trigger_payload_or(explicit)?;
    let outcome = forward_payload(&state.client, &state.config.pipeline_url, &payload).await?;

    let content_type = outcome
        .content_type
        .unwrap_or_else(|| "application/json".to_string());
    Response::builder()
        .status(outcome.status)
        .header(header::CONTENT_TYPE, content_type)
        .body(outcome.body.into())
        .map_err(|err| RelayError::Internal(err.to_string()))
}

// ─── Lifecycle and diagnostics ──────────────────────────────────────────────

async fn shutdown(State(state): State<AppState>) -> Json<Value> {
    info!("Shutdown requested");
    let token = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        token.cancel();
    });
    Json(json!({ "ok": true }))
}

async fn debug_event(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    if !state.config.debug {
        return Json(json!({ "ok": true, "ignored": true }));
    }
    let event: Value = serde_json::from_slice(&body).unwrap_or_else(|_| json!({ "raw": true }));
    let kind = event
        .get("type")
        .and_then(|value| value.as_str())
        .unwrap_or("event");
    info!("Frontend event {kind}: {event}");
    Json(json!({ "ok": true }))
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn png_response(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "image/png")], bytes).into_response()
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}
