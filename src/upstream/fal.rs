//! fal.ai synchronous inference endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ImageGenerator, UpstreamError, base_url, send_for_body};

const SERVICE: &str = "fal";

/// Default diffusion model on fal.ai
pub const DEFAULT_FAL_MODEL: &str = "fal-ai/flux/schnell";

#[derive(Serialize, Debug)]
struct FalRequest<'a> {
    prompt: &'a str,
    num_images: u8,
}

#[derive(Deserialize, Debug)]
struct FalResponse {
    #[serde(default)]
    images: Vec<FalImage>,
}

#[derive(Deserialize, Debug)]
struct FalImage {
    url: String,
}

/// Panel rendering via `POST {base}/{model}`.
#[derive(Clone, Debug)]
pub struct FalImages {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl FalImages {
    /// Creates a client for the given fal model id, eg `fal-ai/flux/schnell`.
    pub fn new(
        client: reqwest::Client,
        base: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            base_url: base_url(base)?,
            api_key: api_key.to_string(),
            model: model.trim_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl ImageGenerator for FalImages {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>, UpstreamError> {
        let request = self
            .client
            .post(format!("{}/{}", self.base_url, self.model))
            .header("Authorization", format!("Key {}", self.api_key))
            .json(&FalRequest {
                prompt,
                num_images: 1,
            });
        let bytes = send_for_body(SERVICE, self.timeout, request).await?;
        let parsed: FalResponse =
            serde_json::from_slice(&bytes).map_err(|err| UpstreamError::InvalidResponse {
                service: SERVICE,
                message: format!("failed to parse response JSON: {err}"),
            })?;
        Ok(parsed.images.into_iter().map(|image| image.url).collect())
    }
}
