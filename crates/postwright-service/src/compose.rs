//! Markdown rendering of a generated post.

use chrono::NaiveDateTime;
use std::fmt::Write;

use crate::models::GeneratedCopy;

/// Builds the downloadable document from the text fields and the image URLs
/// that are currently set, in slot order.
pub fn compose_markdown(copy: &GeneratedCopy, image_urls: &[&str], now: NaiveDateTime) -> String {
    let mut doc = format!(
        "# Social Post\n\n## Post\n{}\n\n## Summary\n{}\n\n## Rationale\n{}\n",
        copy.post.trim(),
        copy.summary.trim(),
        copy.rationale.trim()
    );

    let urls: Vec<&str> = image_urls
        .iter()
        .copied()
        .filter(|url| !url.is_empty())
        .collect();
    if !urls.is_empty() {
        doc.push_str("\n## Generated Images\n");
        for (n, url) in urls.iter().enumerate() {
            // Writing to a String cannot fail.
            let _ = write!(doc, "![Generated Image {}]({url})\n\n", n + 1);
        }
    }

    let _ = write!(
        doc,
        "\n---\n*Generated on {}*\n",
        now.format("%Y-%m-%d at %H:%M UTC")
    );
    doc
}

/// Attachment file name for a record's document.
pub fn markdown_filename(id: i32, created_at: NaiveDateTime) -> String {
    format!("post_{id}_{}.md", created_at.format("%Y%m%d_%H%M"))
}
