//! In-memory database and stand-ins for the external services, shared by
//! unit and integration tests.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::MigrationHarness;
use std::sync::{Arc, Mutex};

use crate::db::MIGRATIONS;
use crate::errors::{ApiError, FetchError, GenerationError, UploadError};
use crate::generation::GenerationService;
use crate::jobs::{ImageJob, ImageJobRunner, JobScheduler, SchedulingError};
use crate::models::{GeneratedCopy, ImageModel, ImageUpdate, NewPostRecord, PostRecord};
use crate::repositories::{PostRepository, SqlitePostRepository};
use crate::services::{BlobStore, Clients, ContentFetcher, ImageGenerator, PromptWriter, TextGenerator};
use crate::{AppState, DefaultAppState};

pub const ARTICLE_TEXT: &str = "Central banks are experimenting with new payment rails.";
pub const STUB_IMAGE_BYTES: &[u8] = b"\x89PNG stub image";

pub fn establish_test_connection() -> SqliteConnection {
    let mut connection =
        SqliteConnection::establish(":memory:").expect("Failed to create in-memory database");

    connection
        .run_pending_migrations(MIGRATIONS)
        .expect("Failed to run migrations");

    connection
}

pub fn test_repository() -> Arc<SqlitePostRepository> {
    Arc::new(SqlitePostRepository::new(Arc::new(Mutex::new(
        establish_test_connection(),
    ))))
}

pub fn sample_copy() -> GeneratedCopy {
    GeneratedCopy {
        post: "Payments are changing fast.\n\n#fintech".to_string(),
        summary: "Banks are modernising how money moves between accounts.".to_string(),
        rationale: "Short hook, one takeaway, a single hashtag.".to_string(),
    }
}

pub fn sample_new_post(source_url: &str, created_at: NaiveDateTime) -> NewPostRecord {
    NewPostRecord::new(
        source_url.to_string(),
        ARTICLE_TEXT.to_string(),
        None,
        sample_copy(),
        created_at,
    )
}

pub struct StubFetcher {
    text: Option<String>,
}

impl StubFetcher {
    pub fn returning(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { text: None }
    }
}

#[async_trait]
impl ContentFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        crate::validation::validate_url(url)?;
        self.text.clone().ok_or(FetchError::Status(404))
    }
}

pub struct StubTextGenerator {
    copy: Option<GeneratedCopy>,
    calls: Mutex<Vec<Option<String>>>,
}

impl StubTextGenerator {
    pub fn returning(copy: GeneratedCopy) -> Self {
        Self {
            copy: Some(copy),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            copy: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Instructions passed on each call, in order.
    pub fn instructions_seen(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for StubTextGenerator {
    async fn generate_text(
        &self,
        _article_text: &str,
        instructions: Option<&str>,
    ) -> Result<GeneratedCopy, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push(instructions.map(str::to_string));
        self.copy.clone().ok_or(GenerationError::Upstream {
            status: 529,
            message: "overloaded".to_string(),
        })
    }
}

pub struct StubPromptWriter {
    prompts: Option<[String; 2]>,
}

impl StubPromptWriter {
    pub fn returning(first: &str, second: &str) -> Self {
        Self {
            prompts: Some([first.to_string(), second.to_string()]),
        }
    }

    pub fn failing() -> Self {
        Self { prompts: None }
    }
}

#[async_trait]
impl PromptWriter for StubPromptWriter {
    async fn derive_prompts(&self, _seed_text: &str) -> Result<[String; 2], GenerationError> {
        self.prompts
            .clone()
            .ok_or_else(|| GenerationError::Malformed("not json".to_string()))
    }
}

pub struct StubImageGenerator {
    failing_models: Vec<ImageModel>,
    calls: Mutex<Vec<(String, ImageModel)>>,
}

impl StubImageGenerator {
    pub fn succeeding() -> Self {
        Self::failing_for(&[])
    }

    pub fn failing_for(models: &[ImageModel]) -> Self {
        Self {
            failing_models: models.to_vec(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, ImageModel)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for StubImageGenerator {
    async fn generate_image(
        &self,
        prompt: &str,
        model: ImageModel,
    ) -> Result<Vec<u8>, GenerationError> {
        self.calls.lock().unwrap().push((prompt.to_string(), model));
        if self.failing_models.contains(&model) {
            return Err(GenerationError::NoImage);
        }
        Ok(STUB_IMAGE_BYTES.to_vec())
    }
}

/// Returns `https://cdn.test/{name_hint}.png`; fails for hints containing
/// any configured fragment.
pub struct StubBlobStore {
    failing_fragments: Vec<String>,
    uploads: Mutex<Vec<String>>,
}

impl StubBlobStore {
    pub fn new() -> Self {
        Self::failing_when(&[])
    }

    pub fn failing_when(fragments: &[&str]) -> Self {
        Self {
            failing_fragments: fragments.iter().map(|f| f.to_string()).collect(),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

impl Default for StubBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for StubBlobStore {
    async fn upload(&self, _bytes: &[u8], name_hint: &str) -> Result<String, UploadError> {
        if self
            .failing_fragments
            .iter()
            .any(|fragment| name_hint.contains(fragment.as_str()))
        {
            return Err(UploadError::Status(503));
        }
        self.uploads.lock().unwrap().push(name_hint.to_string());
        Ok(format!("https://cdn.test/{name_hint}.png"))
    }
}

/// The concrete stubs behind a [`Clients`], kept so tests can inspect them.
pub struct StubClients {
    pub fetcher: Arc<StubFetcher>,
    pub text: Arc<StubTextGenerator>,
    pub prompts: Arc<StubPromptWriter>,
    pub images: Arc<StubImageGenerator>,
    pub blobs: Arc<StubBlobStore>,
}

impl Default for StubClients {
    fn default() -> Self {
        Self {
            fetcher: Arc::new(StubFetcher::returning(ARTICLE_TEXT)),
            text: Arc::new(StubTextGenerator::returning(sample_copy())),
            prompts: Arc::new(StubPromptWriter::returning(
                "abstract teal ledger lines",
                "soft gradient coins and arrows",
            )),
            images: Arc::new(StubImageGenerator::succeeding()),
            blobs: Arc::new(StubBlobStore::new()),
        }
    }
}

impl StubClients {
    pub fn clients(&self) -> Clients {
        Clients {
            fetcher: self.fetcher.clone(),
            text: self.text.clone(),
            prompts: self.prompts.clone(),
            images: self.images.clone(),
            blobs: self.blobs.clone(),
        }
    }
}

/// Collects scheduled jobs without running them.
#[derive(Default)]
pub struct RecordingScheduler {
    jobs: Mutex<Vec<ImageJob>>,
}

impl RecordingScheduler {
    pub fn jobs(&self) -> Vec<ImageJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl JobScheduler for RecordingScheduler {
    fn schedule(&self, job: ImageJob) -> Result<(), SchedulingError> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

pub struct FailingScheduler(pub SchedulingError);

impl JobScheduler for FailingScheduler {
    fn schedule(&self, _job: ImageJob) -> Result<(), SchedulingError> {
        Err(self.0.clone())
    }
}

/// Delegates to an inner repository but refuses every image update.
pub struct FailingUpdateRepository<R> {
    pub inner: Arc<R>,
}

#[async_trait]
impl<R: PostRepository> PostRepository for FailingUpdateRepository<R> {
    async fn create(&self, post: &NewPostRecord) -> Result<PostRecord, ApiError> {
        self.inner.create(post).await
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<PostRecord>, ApiError> {
        self.inner.find_by_id(id).await
    }

    async fn list_newest_first(&self) -> Result<Vec<PostRecord>, ApiError> {
        self.inner.list_newest_first().await
    }

    async fn apply_image_update(
        &self,
        _id: i32,
        _update: ImageUpdate,
        _now: NaiveDateTime,
    ) -> Result<PostRecord, ApiError> {
        Err(ApiError::InternalError)
    }

    async fn clear_images_pending(
        &self,
        id: i32,
        completed_at: Option<NaiveDateTime>,
    ) -> Result<(), ApiError> {
        self.inner.clear_images_pending(id, completed_at).await
    }
}

/// A service wired to an in-memory database, stub clients and a
/// recording scheduler.
pub struct TestHarness {
    pub posts: Arc<SqlitePostRepository>,
    pub stubs: StubClients,
    pub scheduler: Arc<RecordingScheduler>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_stubs(StubClients::default())
    }

    pub fn with_stubs(stubs: StubClients) -> Self {
        Self {
            posts: test_repository(),
            stubs,
            scheduler: Arc::new(RecordingScheduler::default()),
        }
    }

    pub fn service(&self) -> GenerationService {
        GenerationService::new(self.posts.clone(), self.stubs.clients(), self.scheduler.clone())
    }

    pub fn runner(&self) -> ImageJobRunner {
        ImageJobRunner::new(self.posts.clone(), self.stubs.clients())
    }

    pub fn app_state(&self) -> DefaultAppState {
        DefaultAppState::new(self.service())
    }

    /// Runs every job the scheduler has collected so far.
    pub async fn run_scheduled_jobs(&self) {
        let runner = self.runner();
        for job in self.scheduler.jobs() {
            runner.run(&job).await.expect("image job failed");
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn create_test_app<S: AppState>(state: S) -> axum::Router {
    crate::create_app(state)
}
