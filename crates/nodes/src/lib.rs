//! Pipeline node adapters for the Easel bridge
//!
//! These run inside the pipeline host's execution graph: the producer
//! ([`CanvasInput`]) pulls the latest canvas image and prompt parameters
//! from the relay, the consumer ([`CanvasOutput`]) pushes a rendered
//! result back. Conversion between encoded images and the host's float
//! tensor layout lives in [`tensor`].

mod client;
mod consumer;
mod producer;
pub mod tensor;

pub use client::BridgeClient;
pub use consumer::CanvasOutput;
pub use producer::{CanvasFrame, CanvasInput};
pub use tensor::ImageTensor;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Image encode failed: {0}")]
    Encode(String),

    #[error("Output push rejected: {0}")]
    Push(String),
}
