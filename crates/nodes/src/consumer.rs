//! Consumer node: pushes a rendered result back to the relay

use crate::client::BridgeClient;
use crate::tensor::ImageTensor;
use crate::NodeError;

/// Graph node that delivers a pipeline image to the editor frontend.
pub struct CanvasOutput {
    client: BridgeClient,
}

impl CanvasOutput {
    pub fn new(client: BridgeClient) -> Self {
        Self { client }
    }

    /// Encode the tensor as PNG and push it to the relay.
    ///
    /// `raw_override` skips the encode step for callers that already hold
    /// encoded bytes. Unlike the producer there is no safe synthetic
    /// substitute for a failed delivery, so every failure propagates.
    pub async fn push(
        &self,
        tensor: &ImageTensor,
        raw_override: Option<Vec<u8>>,
    ) -> Result<(), NodeError> {
        let bytes = match raw_override {
            Some(bytes) => bytes,
            None => tensor.encode_png()?,
        };
        self.client.push_output(bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_failure_propagates() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let node = CanvasOutput::new(
            BridgeClient::new(format!("http://127.0.0.1:{port}")).unwrap(),
        );
        let result = node.push(&ImageTensor::blank(4, 4), None).await;
        assert!(matches!(result, Err(NodeError::Connection(_))));
    }

    #[tokio::test]
    async fn test_raw_override_skips_encoding() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        // A tensor that cannot matter: the override bytes are sent as-is,
        // so the only possible failure is the unreachable relay.
        let node = CanvasOutput::new(
            BridgeClient::new(format!("http://127.0.0.1:{port}")).unwrap(),
        );
        let result = node
            .push(&ImageTensor::blank(1, 1), Some(b"pre-encoded".to_vec()))
            .await;
        assert!(matches!(result, Err(NodeError::Connection(_))));
    }
}
