//! OpenAI Responses API (scene planning) and Images API (panel rendering).

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use rand::RngExt;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{ImageGenerator, TextGenerator, UpstreamError, base_url, send_for_body};
use crate::constants::PANEL_URL_PREFIX;

/// Image model used when the OpenAI backend is picked without naming one
pub const DEFAULT_OPENAI_IMAGE_MODEL: &str = "gpt-image-1";

const TEXT_SERVICE: &str = "openai responses";
const IMAGE_SERVICE: &str = "openai images";

// -----------------------------
// Responses API (text)
// -----------------------------

#[derive(Debug, Deserialize, Serialize)]
struct ResponsesCreateResponse {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<ResponseOutputItem>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ResponseOutputItem {
    #[serde(default)]
    content: Vec<ResponseContentItem>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
enum ResponseContentItem {
    #[serde(rename = "output_text")]
    OutputText { text: String },
    #[serde(other)]
    Other,
}

/// Text generation over `POST /v1/responses`, asking for a JSON object answer.
#[derive(Clone, Debug)]
pub struct OpenAiText {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiText {
    /// Creates a client for the given model.
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
            model: model.to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiText {
    async fn complete(
        &self,
        instruction: &str,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Result<String, UpstreamError> {
        // Structured output in JSON mode; the instruction itself names the keys.
        let req_body = json!({
            "model": self.model,
            "input": instruction,
            "max_output_tokens": max_output_tokens,
            "temperature": temperature,
            "text": {
                "format": { "type": "json_object" }
            }
        });

        let request = self
            .client
            .post(format!("{}/v1/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req_body);
        let bytes = send_for_body(TEXT_SERVICE, self.timeout, request).await?;

        let parsed: ResponsesCreateResponse =
            serde_json::from_slice(&bytes).map_err(|err| UpstreamError::InvalidResponse {
                service: TEXT_SERVICE,
                message: format!("failed to parse response JSON: {err}"),
            })?;
        if let Some(err) = parsed.error
            && !err.is_null()
        {
            return Err(UpstreamError::InvalidResponse {
                service: TEXT_SERVICE,
                message: format!("API returned error: {err}"),
            });
        }

        parsed
            .output_text
            .or_else(|| {
                parsed
                    .output
                    .iter()
                    .flat_map(|item| item.content.iter())
                    .find_map(|content| {
                        if let ResponseContentItem::OutputText { text } = content {
                            Some(text.clone())
                        } else {
                            None
                        }
                    })
            })
            .map(|text| text.trim().to_string())
            .ok_or_else(|| UpstreamError::InvalidResponse {
                service: TEXT_SERVICE,
                message: "missing output_text".to_string(),
            })
    }
}

// -----------------------------
// Images API
// -----------------------------

/// Request body for POST /v1/images/generations
#[derive(Serialize, Debug)]
struct ImagesGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,

    // For GPT image models.
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    output_format: Option<&'a str>,

    // For dall-e models.
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
struct ImagesGenerateResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize, Debug)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
    revised_prompt: Option<String>,
}

/// Panel rendering over `POST /v1/images/generations`.
///
/// GPT image models only ever answer with base64 data, so those panels are
/// written to `panel_dir` and handed back as `/panels/<file>` URLs served by the
/// web layer. Hosted URLs are passed through untouched.
#[derive(Clone, Debug)]
pub struct OpenAiImages {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    panel_dir: PathBuf,
    timeout: Duration,
}

impl OpenAiImages {
    /// Creates a client for the given image model.
    pub fn new(
        client: reqwest::Client,
        base: &str,
        api_key: &str,
        model: &str,
        panel_dir: PathBuf,
        timeout: Duration,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            base_url: base_url(base)?,
            api_key: api_key.to_string(),
            model: model.to_string(),
            panel_dir,
            timeout,
        })
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> ImagesGenerateRequest<'a> {
        if self.model.starts_with("gpt-image") {
            ImagesGenerateRequest {
                model: &self.model,
                prompt,
                n: 1,
                size: "1024x1024",
                quality: Some("medium"),
                output_format: Some("png"),
                response_format: None,
            }
        } else {
            // dall-e models can hand back a hosted URL
            ImagesGenerateRequest {
                model: &self.model,
                prompt,
                n: 1,
                size: "1024x1024",
                quality: None,
                output_format: None,
                response_format: Some("url"),
            }
        }
    }

    async fn store_panel(&self, b64_json: &str) -> Result<String, UpstreamError> {
        let bytes = general_purpose::STANDARD
            .decode(b64_json)
            .map_err(|err| UpstreamError::InvalidResponse {
                service: IMAGE_SERVICE,
                message: format!("failed to base64-decode image: {err}"),
            })?;

        let filename = format!("{}.png", panel_file_stem());
        let write_failed = |err: std::io::Error| UpstreamError::InvalidResponse {
            service: IMAGE_SERVICE,
            message: format!("failed to store panel {filename}: {err}"),
        };
        tokio::fs::create_dir_all(&self.panel_dir)
            .await
            .map_err(write_failed)?;
        tokio::fs::write(self.panel_dir.join(&filename), bytes)
            .await
            .map_err(write_failed)?;
        debug!("Stored panel {}", filename);
        Ok(format!("{PANEL_URL_PREFIX}/{filename}"))
    }
}

/// Random file stem for a stored panel.
fn panel_file_stem() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase()
}

#[async_trait]
impl ImageGenerator for OpenAiImages {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>, UpstreamError> {
        let request = self
            .client
            .post(format!("{}/v1/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt));
        let bytes = send_for_body(IMAGE_SERVICE, self.timeout, request).await?;

        let parsed: ImagesGenerateResponse =
            serde_json::from_slice(&bytes).map_err(|err| UpstreamError::InvalidResponse {
                service: IMAGE_SERVICE,
                message: format!("failed to parse response JSON: {err}"),
            })?;

        let mut urls = Vec::with_capacity(parsed.data.len());
        for image in parsed.data {
            if let Some(revised_prompt) = image.revised_prompt {
                debug!("Revised prompt from OpenAI: {}", revised_prompt);
            }
            if let Some(url) = image.url {
                urls.push(url);
            } else if let Some(b64_json) = image.b64_json {
                urls.push(self.store_panel(&b64_json).await?);
            } else {
                warn!("Image response missing b64_json and url fields");
            }
        }
        Ok(urls)
    }
}
