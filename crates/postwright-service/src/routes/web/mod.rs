//! Server-rendered pages: the submission form, a single post and the history.

use axum::{
    Form, Router,
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::AppState;
use crate::errors::ApiError;
use crate::models::{ImageSlot, PostRecord};

#[derive(Debug, Deserialize)]
struct GenerateForm {
    url: String,
    #[serde(default)]
    instructions: String,
}

/// Renders an [`ApiError`] as a page instead of JSON.
struct PageError(ApiError);

impl From<ApiError> for PageError {
    fn from(err: ApiError) -> Self {
        PageError(err)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let body = format!(
            "<h1>Something went wrong</h1>\n<p class=\"error\">{}</p>\n<p><a href=\"/web\">Back</a></p>",
            escape_html(&self.0.public_message())
        );
        (status, Html(layout("Error", &body))).into_response()
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{} | Postwright</title>\n</head>\n<body>\n<nav><a href=\"/web\">New post</a> | <a href=\"/web/history\">History</a></nav>\n<main>\n{}\n</main>\n</body>\n</html>\n",
        escape_html(title),
        body
    )
}

/// Instructions the form starts with.
pub const DEFAULT_INSTRUCTIONS: &str = "Please create a professional LinkedIn post that:
- Highlights key insights from the article
- Includes actionable takeaways for business professionals
- Uses an engaging tone that encourages discussion
- Contains relevant hashtags for maximum reach
";

async fn index() -> Html<String> {
    let body = format!(
        r#"<h1>Generate a social post</h1>
<form method="post" action="/web/generate">
<label>Article URL <input type="url" name="url" required></label>
<label>Instructions (optional) <textarea name="instructions" rows="6">{}</textarea></label>
<button type="submit">Generate</button>
</form>"#,
        escape_html(DEFAULT_INSTRUCTIONS)
    );
    Html(layout("New post", &body))
}

#[instrument(skip_all, fields(url = %form.url))]
async fn generate<S: AppState>(
    State(state): State<S>,
    Form(form): Form<GenerateForm>,
) -> Result<Redirect, PageError> {
    let instructions = Some(form.instructions.as_str()).filter(|s| !s.trim().is_empty());
    let record = state.generation().generate(&form.url, instructions).await?;

    info!(id = record.id, "Generated post from form");
    Ok(Redirect::to(&format!("/web/posts/{}", record.id)))
}

fn render_post(record: &PostRecord) -> String {
    let mut body = format!(
        "<h1>Post #{id}</h1>\n<p>Source: <a href=\"{url}\">{url}</a></p>\n<h2>Post</h2>\n<div class=\"post\">{post}</div>\n<h2>Summary</h2>\n<p>{summary}</p>\n<h2>Rationale</h2>\n<p>{rationale}</p>\n",
        id = record.id,
        url = escape_html(&record.source_url),
        post = escape_html(&record.post_body).replace('\n', "<br>\n"),
        summary = escape_html(&record.summary),
        rationale = escape_html(&record.rationale),
    );

    body.push_str("<h2>Images</h2>\n");
    if record.images_pending {
        body.push_str("<p class=\"pending\">Images are still being generated. Refresh to check again.</p>\n");
    }
    for slot in ImageSlot::ALL {
        if let Some(image) = record.image(slot) {
            body.push_str(&format!(
                "<figure><img src=\"{}\" alt=\"Generated Image {}\" width=\"512\"><figcaption>{}</figcaption></figure>\n",
                escape_html(&image.url),
                slot.number(),
                escape_html(&image.prompt)
            ));
        }
    }
    if !record.images_pending && record.image_urls().is_empty() {
        body.push_str("<p>No images were generated for this post.</p>\n");
    }

    body.push_str(&format!(
        "<p><a href=\"/api/v1/posts/{}/markdown\">Download markdown</a></p>\n",
        record.id
    ));
    body
}

#[instrument(skip_all, fields(id = %id))]
async fn show_post<S: AppState>(
    State(state): State<S>,
    Path(id): Path<i32>,
) -> Result<Html<String>, PageError> {
    let record = state.generation().find(id).await?;
    Ok(Html(layout(&format!("Post #{}", record.id), &render_post(&record))))
}

#[instrument(skip_all)]
async fn history<S: AppState>(State(state): State<S>) -> Result<Html<String>, PageError> {
    let records = state.generation().list().await?;

    let mut body = String::from("<h1>History</h1>\n");
    if records.is_empty() {
        body.push_str("<p>No posts yet.</p>\n");
    } else {
        body.push_str("<ul>\n");
        for record in &records {
            body.push_str(&format!(
                "<li><a href=\"/web/posts/{}\">{}</a> <small>{} UTC</small></li>\n",
                record.id,
                escape_html(&record.summary),
                record.created_at.format("%Y-%m-%d %H:%M"),
            ));
        }
        body.push_str("</ul>\n");
    }

    Ok(Html(layout("History", &body)))
}

pub fn create_web_router<S: AppState>() -> Router<S> {
    Router::new()
        .route("/", get(index))
        .route("/generate", post(generate::<S>))
        .route("/posts/{id}", get(show_post::<S>))
        .route("/history", get(history::<S>))
}
