//! Clients for the text and image generation services the pipeline depends on.
//!
//! The pipeline only sees the [TextGenerator] and [ImageGenerator] traits; the
//! concrete OpenAI and fal.ai clients live in the submodules.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

pub mod fal;
pub mod openai;

/// Transport or protocol failure talking to an external service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connection, DNS, TLS or body read failure.
    #[error("{service} request failed: {message}")]
    Transport {
        /// Which service we were calling
        service: &'static str,
        /// Underlying error text
        message: String,
    },
    /// The service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        /// Which service we were calling
        service: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body, lossily decoded
        body: String,
    },
    /// No answer within the configured timeout.
    #[error("{service} timed out after {}s", after.as_secs())]
    Timeout {
        /// Which service we were calling
        service: &'static str,
        /// The timeout that elapsed
        after: Duration,
    },
    /// The service answered but not in a shape we understand.
    #[error("{service} returned an unusable response: {message}")]
    InvalidResponse {
        /// Which service we were calling
        service: &'static str,
        /// What was wrong with it
        message: String,
    },
}

impl UpstreamError {
    /// Maps a reqwest error, keeping timeouts distinct from other transport failures.
    pub(crate) fn from_reqwest(service: &'static str, timeout: Duration, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout {
                service,
                after: timeout,
            }
        } else {
            UpstreamError::Transport {
                service,
                message: err.to_string(),
            }
        }
    }
}

/// A language model that can answer one instruction with (JSON-shaped) text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends a single instruction and returns the model's raw text answer.
    async fn complete(
        &self,
        instruction: &str,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Result<String, UpstreamError>;
}

/// An image model that renders a prompt into one or more hosted images.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Renders the prompt, returning image URLs in the order the service gave them.
    async fn generate(&self, prompt: &str) -> Result<Vec<String>, UpstreamError>;
}

/// Builds the shared HTTP client with an overall per-request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Normalises a configured base URL so paths can be appended with `/`.
pub(crate) fn base_url(raw: &str) -> Result<String, url::ParseError> {
    let parsed = Url::parse(raw)?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

/// Sends a request and returns the body of a successful response.
pub(crate) async fn send_for_body(
    service: &'static str,
    timeout: Duration,
    request: reqwest::RequestBuilder,
) -> Result<Vec<u8>, UpstreamError> {
    let resp = request
        .send()
        .await
        .map_err(|err| UpstreamError::from_reqwest(service, timeout, &err))?;
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .map_err(|err| UpstreamError::from_reqwest(service, timeout, &err))?;
    if !status.is_success() {
        return Err(UpstreamError::Status {
            service,
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).to_string(),
        });
    }
    Ok(bytes.to_vec())
}
