//! Easel relay server
//!
//! A small HTTP relay between a browser canvas editor and an external
//! image-generation pipeline host. The relay holds the latest input image,
//! output image, and prompt parameters in process memory; the browser
//! pushes and polls one side, the pipeline's node adapters poll and push
//! the other. Nothing is persisted; the whole session dies with the
//! process.

pub mod error;
pub mod forward;
pub mod routes;
pub mod state;

pub use error::RelayError;
pub use forward::{spawn_forwarder, ForwardQueue, ForwardResult};
pub use routes::{app_router, AppState};
pub use state::{InputUpdate, SessionState, SessionStore, StoreError};
