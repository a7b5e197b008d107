use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::ImageJob;
use crate::errors::ApiError;
use crate::models::{ImageRef, ImageSlot, ImageUpdate, PostRecord};
use crate::repositories::PostRepository;
use crate::services::{Clients, generate_images};

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The record was no longer pending; nothing was done.
    AlreadyComplete,
    /// Images were attempted and the record finished.
    Completed { images_generated: usize },
    /// The job failed but the record was released from pending.
    Abandoned { error: String },
}

/// Performs image jobs against the record store.
#[derive(Clone)]
pub struct ImageJobRunner {
    posts: Arc<dyn PostRepository>,
    clients: Clients,
}

impl ImageJobRunner {
    pub fn new(posts: Arc<dyn PostRepository>, clients: Clients) -> Self {
        Self { posts, clients }
    }

    /// Runs one job. Only the record id and seed text come from the job;
    /// everything else is read from the record, so running the same job
    /// twice is harmless.
    ///
    /// A missing record is a terminal error. Any later failure clears the
    /// pending flag before returning, so no record stays pending forever.
    #[instrument(skip_all, fields(post_id = job.post_id))]
    pub async fn run(&self, job: &ImageJob) -> Result<JobOutcome, ApiError> {
        info!("Starting image job");

        let record = self
            .posts
            .find_by_id(job.post_id)
            .await?
            .ok_or(ApiError::NotFound)?;

        if !record.images_pending {
            info!("Images already processed");
            return Ok(JobOutcome::AlreadyComplete);
        }

        match self.fill_images(job, &record).await {
            Ok(images_generated) => {
                info!(images_generated, "Image job completed");
                Ok(JobOutcome::Completed { images_generated })
            }
            Err(err) => {
                error!(error = %err, "Image job failed");
                let now = Utc::now().naive_utc();
                match self.posts.clear_images_pending(job.post_id, Some(now)).await {
                    Ok(()) => {
                        warn!("Released record from pending after failure");
                        Ok(JobOutcome::Abandoned {
                            error: err.to_string(),
                        })
                    }
                    Err(clear_err) => {
                        error!(error = %clear_err, "Could not release record from pending");
                        Err(err)
                    }
                }
            }
        }
    }

    async fn fill_images(&self, job: &ImageJob, record: &PostRecord) -> Result<usize, ApiError> {
        let seed_text = if job.seed_text.trim().is_empty() {
            record.summary.as_str()
        } else {
            job.seed_text.as_str()
        };

        let batch = generate_images(
            self.clients.prompts.as_ref(),
            self.clients.images.as_ref(),
            seed_text,
        )
        .await;

        let mut update = ImageUpdate {
            finish: true,
            ..ImageUpdate::default()
        };

        for slot in ImageSlot::ALL {
            let Some(bytes) = &batch.images[slot.index()] else {
                continue;
            };
            let name_hint = format!("post_{}_image_{}", record.id, slot.number());
            match self.clients.blobs.upload(bytes, &name_hint).await {
                Ok(url) => {
                    info!(%slot, %url, "Image uploaded");
                    update.slots[slot.index()] = Some(ImageRef {
                        url,
                        prompt: batch.prompts[slot.index()].clone(),
                    });
                }
                Err(err) => warn!(%slot, error = %err, "Image upload failed"),
            }
        }

        let images_generated = update.populated();
        self.posts
            .apply_image_update(record.id, update, Utc::now().naive_utc())
            .await?;
        Ok(images_generated)
    }
}
