//! Clients for the external services the pipeline depends on.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BlobConfig, Config};
use crate::errors::ApiError;

pub mod fetcher;
pub mod images;
pub mod prompts;
pub mod storage;
pub mod text;

pub use fetcher::{ContentFetcher, HttpContentFetcher};
pub use images::{HttpImageClient, ImageBatch, ImageGenerator, generate_images};
pub use prompts::PromptWriter;
pub use storage::{BlobStore, HttpBlobStore, LocalBlobStore};
pub use text::{MessagesClient, TextGenerator};

/// Upper bound on a single generation or upload call.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// External clients, constructed once at start-up and shared.
#[derive(Clone)]
pub struct Clients {
    pub fetcher: Arc<dyn ContentFetcher>,
    pub text: Arc<dyn TextGenerator>,
    pub prompts: Arc<dyn PromptWriter>,
    pub images: Arc<dyn ImageGenerator>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Clients {
    /// Builds the production clients described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let blobs: Arc<dyn BlobStore> = match &config.blob {
            BlobConfig::Local { dir, public_url } => {
                Arc::new(LocalBlobStore::new(dir.clone(), public_url.clone()))
            }
            BlobConfig::Http {
                upload_url,
                public_url,
            } => Arc::new(HttpBlobStore::new(
                upload_url.clone(),
                public_url.clone(),
                UPSTREAM_TIMEOUT,
            )?),
        };

        let messages = Arc::new(MessagesClient::new(
            config.text_api_url.clone(),
            config.text_api_key.clone(),
            config.text_model.clone(),
            UPSTREAM_TIMEOUT,
        )?);

        Ok(Clients {
            fetcher: Arc::new(HttpContentFetcher::new(
                config.fetch_timeout,
                config.allow_local_fetch,
            )?),
            text: messages.clone(),
            prompts: messages,
            images: Arc::new(HttpImageClient::new(
                config.image_api_url.clone(),
                config.image_api_key.clone(),
                config.nova_model.clone(),
                config.titan_model.clone(),
                UPSTREAM_TIMEOUT,
            )?),
            blobs,
        })
    }
}
