use super::traits::PostRepository;
use crate::errors::ApiError;
use crate::models::{ImageChanges, ImageUpdate, NewPostRecord, PostRecord};
use crate::schema::generated_posts;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::error;

#[derive(Clone)]
pub struct SqlitePostRepository {
    db: Arc<Mutex<SqliteConnection>>,
}

impl SqlitePostRepository {
    pub fn new(db: Arc<Mutex<SqliteConnection>>) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<MutexGuard<'_, SqliteConnection>, ApiError> {
        self.db.lock().map_err(|_| {
            error!("Database connection mutex poisoned");
            ApiError::InternalError
        })
    }
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn create(&self, post: &NewPostRecord) -> Result<PostRecord, ApiError> {
        let mut conn = self.conn()?;
        let result = diesel::insert_into(generated_posts::table)
            .values(post)
            .returning(PostRecord::as_returning())
            .get_result(&mut *conn)?;
        Ok(result)
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<PostRecord>, ApiError> {
        let mut conn = self.conn()?;
        let result = generated_posts::table
            .find(id)
            .select(PostRecord::as_select())
            .first(&mut *conn)
            .optional()?;
        Ok(result)
    }

    async fn list_newest_first(&self) -> Result<Vec<PostRecord>, ApiError> {
        let mut conn = self.conn()?;
        let result = generated_posts::table
            .order((generated_posts::created_at.desc(), generated_posts::id.desc()))
            .select(PostRecord::as_select())
            .load(&mut *conn)?;
        Ok(result)
    }

    async fn apply_image_update(
        &self,
        id: i32,
        update: ImageUpdate,
        now: NaiveDateTime,
    ) -> Result<PostRecord, ApiError> {
        let mut conn = self.conn()?;
        conn.transaction::<_, ApiError, _>(|conn| {
            let mut record = generated_posts::table
                .find(id)
                .select(PostRecord::as_select())
                .first(conn)
                .optional()?
                .ok_or(ApiError::NotFound)?;

            record.apply_image_update(update, now);

            diesel::update(generated_posts::table.find(id))
                .set(ImageChanges::from(&record))
                .execute(conn)?;
            Ok(record)
        })
    }

    async fn clear_images_pending(
        &self,
        id: i32,
        completed_at: Option<NaiveDateTime>,
    ) -> Result<(), ApiError> {
        let mut conn = self.conn()?;
        conn.transaction::<_, ApiError, _>(|conn| {
            let updated = diesel::update(generated_posts::table.find(id))
                .set(generated_posts::images_pending.eq(false))
                .execute(conn)?;
            if updated == 0 {
                return Err(ApiError::NotFound);
            }

            if let Some(completed_at) = completed_at {
                diesel::update(
                    generated_posts::table
                        .find(id)
                        .filter(generated_posts::images_completed_at.is_null()),
                )
                .set(generated_posts::images_completed_at.eq(completed_at))
                .execute(conn)?;
            }
            Ok(())
        })
    }
}
