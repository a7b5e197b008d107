use crate::errors::ApiError;
use crate::models::{ImageUpdate, NewPostRecord, PostRecord};
use async_trait::async_trait;
use chrono::NaiveDateTime;

#[async_trait]
pub trait PostRepository: Send + Sync + 'static {
    async fn create(&self, post: &NewPostRecord) -> Result<PostRecord, ApiError>;
    async fn find_by_id(&self, id: i32) -> Result<Option<PostRecord>, ApiError>;
    async fn list_newest_first(&self) -> Result<Vec<PostRecord>, ApiError>;

    /// Reloads the record, applies `update` and writes it back in one
    /// transaction. Returns the record as written.
    async fn apply_image_update(
        &self,
        id: i32,
        update: ImageUpdate,
        now: NaiveDateTime,
    ) -> Result<PostRecord, ApiError>;

    /// Sets `images_pending` to false without touching the image columns.
    /// `completed_at` is only written when the record has no completion
    /// time yet.
    async fn clear_images_pending(
        &self,
        id: i32,
        completed_at: Option<NaiveDateTime>,
    ) -> Result<(), ApiError>;
}
