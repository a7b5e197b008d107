//! Text generation over an Anthropic-style Messages API.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

use crate::errors::GenerationError;
use crate::models::GeneratedCopy;
use crate::services::prompts::PromptWriter;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS_COPY: u32 = 4000;
const MAX_TOKENS_PROMPTS: u32 = 1000;
const TEMPERATURE: f32 = 0.7;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Writes a post, summary and rationale for an article.
    async fn generate_text(
        &self,
        article_text: &str,
        instructions: Option<&str>,
    ) -> Result<GeneratedCopy, GenerationError>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PromptPair {
    prompt1: String,
    prompt2: String,
}

/// Messages API client used for post copy and image prompts.
#[derive(Debug, Clone)]
pub struct MessagesClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl MessagesClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Sends a single user message and returns the concatenated text reply.
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            temperature: TEMPERATURE,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send request to text model");
                GenerationError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = %status, body = %message, "Text model returned error");
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let text: String = body
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        debug!(chars = text.len(), "Received completion");
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for MessagesClient {
    async fn generate_text(
        &self,
        article_text: &str,
        instructions: Option<&str>,
    ) -> Result<GeneratedCopy, GenerationError> {
        let prompt = copy_prompt(article_text, instructions);
        let reply = self.complete(&prompt, MAX_TOKENS_COPY).await?;
        parse_generated_copy(&reply)
    }
}

#[async_trait]
impl PromptWriter for MessagesClient {
    async fn derive_prompts(&self, seed_text: &str) -> Result<[String; 2], GenerationError> {
        let reply = self
            .complete(&image_prompt_request(seed_text), MAX_TOKENS_PROMPTS)
            .await?;
        parse_prompt_pair(&reply)
    }
}

fn copy_prompt(article_text: &str, instructions: Option<&str>) -> String {
    let extra = instructions
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("\nAdditional instructions from the author:\n{s}\n"))
        .unwrap_or_default();

    format!(
        r#"You write professional social media posts about articles.

Article:
{article_text}
{extra}
Reply with a single JSON object and nothing else. It must have exactly these string fields:
  "post": a 150-300 word post, engaging but professional, with 3-5 relevant hashtags
  "summary": 3-4 sentences covering the article's key points
  "rationale": 2-3 sentences on why the article matters to business readers"#
    )
}

fn image_prompt_request(seed_text: &str) -> String {
    format!(
        r#"Write two image-generation prompts to illustrate a social media post about:
"{seed_text}"

Both prompts must fit the topic, look professional, be visually distinct from each other,
and contain no text, logos or identifiable people.

Reply with a single JSON object and nothing else:
{{"prompt1": "...", "prompt2": "..."}}"#
    )
}

/// Removes a surrounding Markdown code fence, if any.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_strict<T: DeserializeOwned>(reply: &str) -> Result<T, GenerationError> {
    serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| GenerationError::Malformed(e.to_string()))
}

fn require_text(field: &str, value: String) -> Result<String, GenerationError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(GenerationError::Malformed(format!("field `{field}` is empty")));
    }
    Ok(value)
}

/// Accepts only an object with exactly `post`, `summary` and `rationale`,
/// all non-blank.
pub fn parse_generated_copy(reply: &str) -> Result<GeneratedCopy, GenerationError> {
    let copy: GeneratedCopy = parse_strict(reply)?;
    Ok(GeneratedCopy {
        post: require_text("post", copy.post)?,
        summary: require_text("summary", copy.summary)?,
        rationale: require_text("rationale", copy.rationale)?,
    })
}

pub fn parse_prompt_pair(reply: &str) -> Result<[String; 2], GenerationError> {
    let pair: PromptPair = parse_strict(reply)?;
    Ok([
        require_text("prompt1", pair.prompt1)?,
        require_text("prompt2", pair.prompt2)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_complete_copy() {
        let reply = r#"{"post": "Hello #world", "summary": "S.", "rationale": "R."}"#;
        let copy = parse_generated_copy(reply).unwrap();
        assert_eq!(copy.post, "Hello #world");
        assert_eq!(copy.summary, "S.");
        assert_eq!(copy.rationale, "R.");
    }

    #[test]
    fn test_accepts_fenced_json() {
        let reply = "```json\n{\"post\": \"P\", \"summary\": \"S\", \"rationale\": \"R\"}\n```";
        assert!(parse_generated_copy(reply).is_ok());
    }

    #[test]
    fn test_missing_field_fails_whole_reply() {
        let reply = r#"{"post": "P", "summary": "S"}"#;
        assert!(matches!(
            parse_generated_copy(reply),
            Err(GenerationError::Malformed(_))
        ));
    }

    #[test]
    fn test_extra_field_is_rejected() {
        let reply = r#"{"post": "P", "summary": "S", "rationale": "R", "hashtags": []}"#;
        assert!(parse_generated_copy(reply).is_err());
    }

    #[test]
    fn test_blank_field_is_rejected() {
        let reply = r#"{"post": "P", "summary": "  ", "rationale": "R"}"#;
        assert!(parse_generated_copy(reply).is_err());
    }

    #[test]
    fn test_prose_reply_is_rejected() {
        assert!(parse_generated_copy("Sure! Here is your post: ...").is_err());
    }

    #[test]
    fn test_prompt_pair() {
        let [first, second] =
            parse_prompt_pair(r#"{"prompt1": "a lighthouse", "prompt2": "a harbor"}"#).unwrap();
        assert_eq!(first, "a lighthouse");
        assert_eq!(second, "a harbor");
        assert!(parse_prompt_pair(r#"{"prompt1": "only one"}"#).is_err());
    }

    #[test]
    fn test_instructions_are_included_when_present() {
        assert!(copy_prompt("body", Some("Keep it short")).contains("Keep it short"));
        assert!(!copy_prompt("body", Some("  ")).contains("Additional instructions"));
    }
}
