use axum::{
    Router,
    extract::{Json, Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json as ResponseJson},
    routing::{get, post},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::AppState;
use crate::compose::markdown_filename;
use crate::errors::ApiError;
use crate::generation::{ImageStatus, RegenerateImage};
use crate::models::{ImageModel, PostRecord};
use crate::validation::ValidationError;

/// Turns an undecodable JSON body into a 400 with the usual error shape.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ValidationError::InvalidBody(rejection.body_text()).into())
}

#[derive(Debug, Deserialize)]
struct CreatePostRequest {
    url: String,
    instructions: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatePostResponse {
    id: i32,
    images_processing: bool,
}

#[derive(Debug, Serialize)]
struct PostSummary {
    id: i32,
    source_url: String,
    summary: String,
    images_processing: bool,
    image_count: usize,
    created_at: NaiveDateTime,
}

impl From<PostRecord> for PostSummary {
    fn from(record: PostRecord) -> Self {
        PostSummary {
            image_count: record.image_urls().len(),
            id: record.id,
            source_url: record.source_url,
            summary: record.summary,
            images_processing: record.images_pending,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct ListPostsResponse {
    items: Vec<PostSummary>,
    total: usize,
}

fn default_model_type() -> String {
    ImageModel::Nova.to_string()
}

/// Slot number as sent by clients: a JSON number or a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageNumber {
    Number(i64),
    Text(String),
}

impl Default for ImageNumber {
    fn default() -> Self {
        ImageNumber::Number(1)
    }
}

impl ImageNumber {
    fn parse(self) -> Result<i64, ValidationError> {
        match self {
            ImageNumber::Number(n) => Ok(n),
            ImageNumber::Text(text) => text.trim().parse().map_err(|_| {
                ValidationError::InvalidBody(format!("image_number must be 1 or 2, got \"{text}\""))
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegenerateImageRequest {
    #[serde(default)]
    prompt_text: String,
    #[serde(default = "default_model_type")]
    model_type: String,
    #[serde(default)]
    image_number: ImageNumber,
}

#[derive(Debug, Serialize)]
struct RegenerateImageResponse {
    success: bool,
    image_url: String,
    prompt: String,
    model_type: ImageModel,
    image_number: u8,
}

#[instrument(skip_all)]
async fn create_post<S: AppState>(
    State(state): State<S>,
    payload: Result<Json<CreatePostRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;
    debug!(url = %payload.url, has_instructions = payload.instructions.is_some(), "Processing generate request");

    let record = state
        .generation()
        .generate(&payload.url, payload.instructions.as_deref())
        .await?;

    info!(id = record.id, images_processing = record.images_pending, "Generated post");

    let location = format!("/web/posts/{}", record.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        ResponseJson(CreatePostResponse {
            id: record.id,
            images_processing: record.images_pending,
        }),
    ))
}

#[instrument(skip_all)]
async fn list_posts<S: AppState>(
    State(state): State<S>,
) -> Result<ResponseJson<ListPostsResponse>, ApiError> {
    let items: Vec<PostSummary> = state
        .generation()
        .list()
        .await?
        .into_iter()
        .map(PostSummary::from)
        .collect();

    info!(returned_count = items.len(), "Listed posts");
    Ok(ResponseJson(ListPostsResponse {
        total: items.len(),
        items,
    }))
}

#[instrument(skip_all, fields(id = %id))]
async fn get_post<S: AppState>(
    State(state): State<S>,
    Path(id): Path<i32>,
) -> Result<ResponseJson<PostRecord>, ApiError> {
    Ok(ResponseJson(state.generation().find(id).await?))
}

#[instrument(skip_all, fields(id = %id))]
async fn image_status<S: AppState>(
    State(state): State<S>,
    Path(id): Path<i32>,
) -> Result<ResponseJson<ImageStatus>, ApiError> {
    Ok(ResponseJson(state.generation().image_status(id).await?))
}

#[instrument(skip_all, fields(id = %id))]
async fn download_markdown<S: AppState>(
    State(state): State<S>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.generation().find(id).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        markdown_filename(record.id, record.created_at)
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        record.markdown_content,
    ))
}

#[instrument(skip_all, fields(id = %id))]
async fn regenerate_image<S: AppState>(
    State(state): State<S>,
    Path(id): Path<i32>,
    payload: Result<Json<RegenerateImageRequest>, JsonRejection>,
) -> Result<ResponseJson<RegenerateImageResponse>, ApiError> {
    let payload = json_body(payload)?;
    let image_number = payload.image_number.parse()?;
    debug!(model = %payload.model_type, image_number, "Processing regenerate request");
    let request = RegenerateImage::parse(&payload.prompt_text, &payload.model_type, image_number)?;
    let (model, slot) = (request.model, request.slot);

    let image = state.generation().regenerate_image(id, request).await?;

    Ok(ResponseJson(RegenerateImageResponse {
        success: true,
        image_url: image.url,
        prompt: image.prompt,
        model_type: model,
        image_number: slot.number(),
    }))
}

pub fn create_api_v1_router<S: AppState>() -> Router<S> {
    Router::new()
        .route("/posts", post(create_post::<S>).get(list_posts::<S>))
        .route("/posts/{id}", get(get_post::<S>))
        .route("/posts/{id}/image-status", get(image_status::<S>))
        .route("/posts/{id}/markdown", get(download_markdown::<S>))
        .route("/posts/{id}/regenerate-image", post(regenerate_image::<S>))
}
