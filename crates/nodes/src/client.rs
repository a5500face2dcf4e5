//! HTTP client for the relay, shared by both node adapters

use std::time::Duration;

use easel_api::PromptBundle;
use easel_config::BridgeConfig;

use crate::NodeError;

const STATUS_TIMEOUT: Duration = Duration::from_millis(600);
const INPUT_FETCH_TIMEOUT: Duration = Duration::from_millis(1500);
const PROMPT_FETCH_TIMEOUT: Duration = Duration::from_millis(800);
const PUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// Thin wrapper over the relay's retrieval and push endpoints.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
}

impl BridgeClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, NodeError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| NodeError::Connection(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &BridgeConfig) -> Result<Self, NodeError> {
        Self::new(config.bridge_url())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Quick liveness probe; any transport failure reads as "down".
    pub async fn is_up(&self) -> bool {
        self.http
            .get(format!("{}/status", self.base_url))
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }

    /// Fetch the current input image.
    ///
    /// `wait` asks the relay to hold the request until new input arrives
    /// or the bound elapses; `None` means answer immediately. A relay
    /// without input responds 204, mapped to `Ok(None)`.
    pub async fn fetch_input(&self, wait: Option<Duration>) -> Result<Option<Vec<u8>>, NodeError> {
        let mut url = format!("{}/get/input", self.base_url);
        let mut timeout = INPUT_FETCH_TIMEOUT;
        if let Some(wait) = wait {
            url = format!("{url}?wait_ms={}", wait.as_millis());
            timeout += wait;
        }

        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| NodeError::Connection(err.to_string()))?;

        match response.status().as_u16() {
            204 => Ok(None),
            200 => {
                let is_image = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(|value| value.starts_with("image/"))
                    .unwrap_or(false);
                if !is_image {
                    return Err(NodeError::Connection(
                        "input endpoint returned a non-image body".to_string(),
                    ));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|err| NodeError::Connection(err.to_string()))?;
                Ok(Some(bytes.to_vec()))
            }
            status => Err(NodeError::Connection(format!(
                "input endpoint returned status {status}"
            ))),
        }
    }

    /// Fetch the current prompt bundle; 204 (nothing submitted yet) maps
    /// to `Ok(None)`.
    pub async fn fetch_prompt(&self) -> Result<Option<PromptBundle>, NodeError> {
        let response = self
            .http
            .get(format!("{}/get/prompt", self.base_url))
            .timeout(PROMPT_FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|err| NodeError::Connection(err.to_string()))?;

        match response.status().as_u16() {
            204 => Ok(None),
            200 => response
                .json::<PromptBundle>()
                .await
                .map(Some)
                .map_err(|err| NodeError::Connection(err.to_string())),
            status => Err(NodeError::Connection(format!(
                "prompt endpoint returned status {status}"
            ))),
        }
    }

    /// Push an encoded output image to the relay.
    pub async fn push_output(&self, bytes: Vec<u8>) -> Result<(), NodeError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("result.png")
            .mime_str("image/png")
            .map_err(|err| NodeError::Push(err.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/push/output", self.base_url))
            .timeout(PUSH_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|err| NodeError::Connection(err.to_string()))?;

        if !response.status().is_success() {
            return Err(NodeError::Push(format!(
                "relay returned status {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let client = BridgeClient::new("http://127.0.0.1:8765/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8765");
    }

    #[tokio::test]
    async fn test_unreachable_relay_reads_as_down() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = BridgeClient::new(format!("http://127.0.0.1:{port}")).unwrap();
        assert!(!client.is_up().await);
        assert!(matches!(
            client.fetch_input(None).await,
            Err(NodeError::Connection(_))
        ));
    }
}
