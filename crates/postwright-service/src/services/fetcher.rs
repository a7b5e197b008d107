//! Article fetching and readable-text extraction.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::errors::FetchError;
use crate::validation::{reject_local_host, validate_url};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; Postwright/0.1; +https://github.com/seridescent)";

/// Elements whose whole subtree is dropped before text extraction.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "svg", "nav", "header", "footer",
    "aside", "menu", "form",
];

/// Class names marking non-article chrome.
const SKIPPED_CLASSES: &[&str] = &["advertisement", "ad", "ads", "sidebar", "menu", "navbar"];

/// Containers tried in order; every match of the first matching selector is used.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "[role=\"main\"]",
    "main",
    ".content",
    ".post-content",
    ".entry-content",
    ".article-content",
    ".story-body",
    ".post-body",
];

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Returns the readable text of the page at `url`.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Fetches pages with reqwest and extracts text with scraper.
pub struct HttpContentFetcher {
    client: reqwest::Client,
    allow_local_hosts: bool,
}

impl HttpContentFetcher {
    pub fn new(timeout: Duration, allow_local_hosts: bool) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self {
            client,
            allow_local_hosts,
        })
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let url = validate_url(url)?;
        if !self.allow_local_hosts {
            reject_local_host(&url)?;
        }

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            warn!(error = %e, "Request failed");
            FetchError::Request(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Non-success status fetching article");
            return Err(FetchError::Status(status.as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let text = extract_article_text(&html);
        if text.is_empty() {
            return Err(FetchError::EmptyContent);
        }

        debug!(chars = text.len(), "Extracted article text");
        Ok(text)
    }
}

/// Pulls the readable text out of an HTML document, whitespace collapsed.
pub fn extract_article_text(html: &str) -> String {
    let document = Html::parse_document(html);

    for selector_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        let parts: Vec<String> = document
            .select(&selector)
            .filter(|element| !inside_skipped(element))
            .map(|element| {
                let mut text = String::new();
                collect_text(element, &mut text);
                collapse_whitespace(&text)
            })
            .filter(|text| !text.is_empty())
            .collect();
        if !parts.is_empty() {
            return parts.join(" ");
        }
    }

    let root = Selector::parse("body")
        .ok()
        .and_then(|body| document.select(&body).next())
        .unwrap_or_else(|| document.root_element());
    let mut text = String::new();
    collect_text(root, &mut text);
    collapse_whitespace(&text)
}

fn is_skipped(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    SKIPPED_ELEMENTS.contains(&value.name())
        || value.classes().any(|class| SKIPPED_CLASSES.contains(&class))
}

/// True when any ancestor of `element` is itself dropped chrome.
fn inside_skipped(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| is_skipped(&ancestor))
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    if !is_skipped(&child) {
                        collect_text(child, out);
                    }
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
