//! Blob storage for generated images.

use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::errors::UploadError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores PNG `bytes` under a key derived from `name_hint` and returns
    /// the public URL.
    async fn upload(&self, bytes: &[u8], name_hint: &str) -> Result<String, UploadError>;
}

/// Unique object key for an image.
pub fn object_key(name_hint: &str) -> String {
    let hint: String = name_hint
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    format!("images/{hint}_{}.png", Uuid::new_v4())
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{key}", base.trim_end_matches('/'))
}

/// Writes images below a directory that is served at `public_base_url`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, bytes: &[u8], name_hint: &str) -> Result<String, UploadError> {
        let key = object_key(name_hint);
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        let url = join_url(&self.public_base_url, &key);
        info!(%url, "Stored image");
        Ok(url)
    }
}

/// Uploads images with HTTP `PUT` to an object store endpoint.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: Client,
    upload_base_url: String,
    public_base_url: String,
}

impl HttpBlobStore {
    pub fn new(
        upload_base_url: impl Into<String>,
        public_base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let upload_base_url = upload_base_url.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Request(e.to_string()))?;
        Ok(Self {
            client,
            public_base_url: public_base_url.unwrap_or_else(|| upload_base_url.clone()),
            upload_base_url,
        })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, bytes: &[u8], name_hint: &str) -> Result<String, UploadError> {
        let key = object_key(name_hint);
        let response = self
            .client
            .put(join_url(&self.upload_base_url, &key))
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Blob upload request failed");
                UploadError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "Blob store rejected upload");
            return Err(UploadError::Status(status.as_u16()));
        }

        let url = join_url(&self.public_base_url, &key);
        info!(%url, "Uploaded image");
        Ok(url)
    }
}
