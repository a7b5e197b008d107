//! Text-to-image generation.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::GenerationError;
use crate::models::{ImageModel, ImageSlot};
use crate::services::prompts::{PromptWriter, derive_image_prompts};

const IMAGE_SIZE: u32 = 1024;
const NEGATIVE_TEXT: &str = "blurry, low quality, distorted, unprofessional, nsfw";

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generates one image for `prompt` and returns its raw bytes.
    async fn generate_image(
        &self,
        prompt: &str,
        model: ImageModel,
    ) -> Result<Vec<u8>, GenerationError>;
}

/// Per-model request tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelTuning {
    pub cfg_scale: f32,
    pub seed: u32,
    pub negative_text: Option<&'static str>,
}

impl ImageModel {
    pub fn tuning(self) -> ModelTuning {
        match self {
            ImageModel::Nova => ModelTuning {
                cfg_scale: 8.0,
                seed: 42,
                negative_text: None,
            },
            ImageModel::Titan => ModelTuning {
                cfg_scale: 7.5,
                seed: 43,
                negative_text: Some(NEGATIVE_TEXT),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextToImageRequest<'a> {
    task_type: &'static str,
    text_to_image_params: TextToImageParams<'a>,
    image_generation_config: ImageGenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextToImageParams<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageGenerationConfig {
    number_of_images: u32,
    height: u32,
    width: u32,
    cfg_scale: f32,
    seed: u32,
}

#[derive(Debug, Deserialize)]
struct TextToImageResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Client for a `POST {base}/model/{model_id}/invoke` text-to-image API.
#[derive(Debug, Clone)]
pub struct HttpImageClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    nova_model_id: String,
    titan_model_id: String,
}

impl HttpImageClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        nova_model_id: impl Into<String>,
        titan_model_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            nova_model_id: nova_model_id.into(),
            titan_model_id: titan_model_id.into(),
        })
    }

    fn model_id(&self, model: ImageModel) -> &str {
        match model {
            ImageModel::Nova => &self.nova_model_id,
            ImageModel::Titan => &self.titan_model_id,
        }
    }
}

#[async_trait]
impl ImageGenerator for HttpImageClient {
    #[instrument(skip_all, fields(model = %model))]
    async fn generate_image(
        &self,
        prompt: &str,
        model: ImageModel,
    ) -> Result<Vec<u8>, GenerationError> {
        let tuning = model.tuning();
        let request = TextToImageRequest {
            task_type: "TEXT_IMAGE",
            text_to_image_params: TextToImageParams {
                text: prompt,
                negative_text: tuning.negative_text,
            },
            image_generation_config: ImageGenerationConfig {
                number_of_images: 1,
                height: IMAGE_SIZE,
                width: IMAGE_SIZE,
                cfg_scale: tuning.cfg_scale,
                seed: tuning.seed,
            },
        };

        let url = format!("{}/model/{}/invoke", self.base_url, self.model_id(model));
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            error!(error = %e, "Failed to send image generation request");
            GenerationError::Request(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = %status, body = %message, "Image model returned error");
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: TextToImageResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let encoded = body.images.into_iter().next().ok_or(GenerationError::NoImage)?;
        let bytes = decode_image(&encoded)?;
        debug!(bytes = bytes.len(), "Image generated");
        Ok(bytes)
    }
}

/// Decodes base64 image data, with or without a `data:` URL prefix.
pub fn decode_image(encoded: &str) -> Result<Vec<u8>, GenerationError> {
    let payload = match encoded.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
        None => encoded,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| GenerationError::Malformed(format!("invalid image encoding: {e}")))?;
    if bytes.is_empty() {
        return Err(GenerationError::NoImage);
    }
    Ok(bytes)
}

/// Prompts and per-slot results of one batch generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    pub images: [Option<Vec<u8>>; 2],
    pub prompts: [String; 2],
}

impl ImageBatch {
    pub fn generated(&self) -> usize {
        self.images.iter().filter(|image| image.is_some()).count()
    }
}

/// Derives two prompts from `seed_text` and generates one image per slot
/// with that slot's model. A failing slot is logged and left empty.
pub async fn generate_images(
    writer: &dyn PromptWriter,
    generator: &dyn ImageGenerator,
    seed_text: &str,
) -> ImageBatch {
    let prompts = derive_image_prompts(writer, seed_text).await;
    let mut images: [Option<Vec<u8>>; 2] = [None, None];

    for slot in ImageSlot::ALL {
        let model = slot.default_model();
        match generator.generate_image(&prompts[slot.index()], model).await {
            Ok(bytes) => {
                info!(%slot, %model, "Generated image");
                images[slot.index()] = Some(bytes);
            }
            Err(err) => warn!(%slot, %model, error = %err, "Image generation failed"),
        }
    }

    ImageBatch { images, prompts }
}
