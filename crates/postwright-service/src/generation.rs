//! The request/response side of the pipeline: submitting an article,
//! reading status and regenerating single images.

use chrono::{NaiveDateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::ApiError;
use crate::jobs::{ImageJob, JobScheduler};
use crate::models::{ImageModel, ImageRef, ImageSlot, ImageUpdate, NewPostRecord, PostRecord};
use crate::repositories::PostRepository;
use crate::services::Clients;
use crate::validation::{ValidationError, validate_prompt_text};

fn rfc3339<S: Serializer>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(at) => serializer
            .serialize_str(&at.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true)),
        None => serializer.serialize_none(),
    }
}

/// Pending/complete view of a record's images, for polling clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageStatus {
    pub images_processing: bool,
    pub images_completed: bool,
    pub image_url_1: Option<String>,
    pub image_url_2: Option<String>,
    #[serde(serialize_with = "rfc3339")]
    pub images_completed_at: Option<NaiveDateTime>,
}

impl From<&PostRecord> for ImageStatus {
    fn from(record: &PostRecord) -> Self {
        ImageStatus {
            images_processing: record.images_pending,
            images_completed: !record.images_pending,
            image_url_1: record.image_url_1.clone(),
            image_url_2: record.image_url_2.clone(),
            images_completed_at: record.images_completed_at,
        }
    }
}

/// A validated request to replace one image.
#[derive(Debug, Clone, PartialEq)]
pub struct RegenerateImage {
    pub slot: ImageSlot,
    pub model: ImageModel,
    pub prompt: String,
}

impl RegenerateImage {
    pub fn parse(
        prompt_text: &str,
        model_type: &str,
        image_number: i64,
    ) -> Result<Self, ValidationError> {
        Ok(RegenerateImage {
            prompt: validate_prompt_text(prompt_text)?,
            model: model_type.parse()?,
            slot: ImageSlot::try_from(image_number)?,
        })
    }
}

pub struct GenerationService {
    posts: Arc<dyn PostRepository>,
    clients: Clients,
    scheduler: Arc<dyn JobScheduler>,
}

impl GenerationService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        clients: Clients,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Self {
        Self {
            posts,
            clients,
            scheduler,
        }
    }

    /// Fetches the article, writes the copy, stores a new record and hands
    /// image work to the scheduler.
    ///
    /// Fetch and text failures abort before anything is stored. If the
    /// image job cannot be scheduled the record's pending flag is cleared
    /// before this returns.
    #[instrument(skip_all, fields(url = %source_url, has_instructions = instructions.is_some()))]
    pub async fn generate(
        &self,
        source_url: &str,
        instructions: Option<&str>,
    ) -> Result<PostRecord, ApiError> {
        let source_url = source_url.trim();
        let instructions = instructions
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let article = self.clients.fetcher.fetch(source_url).await?;
        debug!(chars = article.len(), "Article fetched");

        let copy = self
            .clients
            .text
            .generate_text(&article, instructions.as_deref())
            .await?;
        debug!("Post copy generated");

        let new_post = NewPostRecord::new(
            source_url.to_string(),
            article,
            instructions,
            copy,
            Utc::now().naive_utc(),
        );
        let mut record = self.posts.create(&new_post).await?;
        info!(post_id = record.id, "Created post record");

        let job = ImageJob {
            post_id: record.id,
            seed_text: record.summary.clone(),
        };
        if let Err(err) = self.scheduler.schedule(job) {
            warn!(post_id = record.id, error = %err, "Could not schedule image job");
            self.posts
                .clear_images_pending(record.id, None)
                .await
                .inspect_err(|e| {
                    error!(post_id = record.id, error = %e, "Could not clear pending flag");
                })?;
            record.images_pending = false;
        }

        Ok(record)
    }

    pub async fn find(&self, id: i32) -> Result<PostRecord, ApiError> {
        self.posts.find_by_id(id).await?.ok_or(ApiError::NotFound)
    }

    pub async fn list(&self) -> Result<Vec<PostRecord>, ApiError> {
        self.posts.list_newest_first().await
    }

    pub async fn image_status(&self, id: i32) -> Result<ImageStatus, ApiError> {
        Ok(ImageStatus::from(&self.find(id).await?))
    }

    /// Generates one image and stores it in the requested slot, leaving the
    /// other slot untouched. The record is unchanged on any failure.
    #[instrument(skip_all, fields(post_id = id, slot = %request.slot, model = %request.model))]
    pub async fn regenerate_image(
        &self,
        id: i32,
        request: RegenerateImage,
    ) -> Result<ImageRef, ApiError> {
        self.find(id).await?;

        let bytes = self
            .clients
            .images
            .generate_image(&request.prompt, request.model)
            .await?;

        let name_hint = format!("post_{id}_regenerated_{}", request.slot.number());
        let url = self.clients.blobs.upload(&bytes, &name_hint).await?;

        let image = ImageRef {
            url,
            prompt: request.prompt,
        };
        self.posts
            .apply_image_update(
                id,
                ImageUpdate::single(request.slot, image.clone()),
                Utc::now().naive_utc(),
            )
            .await?;

        info!(url = %image.url, "Regenerated image");
        Ok(image)
    }
}
