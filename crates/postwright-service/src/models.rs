use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::compose::compose_markdown;
use crate::validation::ValidationError;

/// One generation request and everything produced for it.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::generated_posts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PostRecord {
    pub id: i32,
    pub source_url: String,
    pub original_content: String,
    pub instructions: Option<String>,
    pub post_body: String,
    pub summary: String,
    pub rationale: String,
    pub image_url_1: Option<String>,
    pub image_prompt_1: Option<String>,
    pub image_url_2: Option<String>,
    pub image_prompt_2: Option<String>,
    pub markdown_content: String,
    pub images_pending: bool,
    pub images_completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::generated_posts)]
pub struct NewPostRecord {
    pub source_url: String,
    pub original_content: String,
    pub instructions: Option<String>,
    pub post_body: String,
    pub summary: String,
    pub rationale: String,
    pub markdown_content: String,
    pub images_pending: bool,
    pub created_at: NaiveDateTime,
}

impl NewPostRecord {
    /// A fresh record with both image slots empty and image work pending.
    pub fn new(
        source_url: String,
        original_content: String,
        instructions: Option<String>,
        copy: GeneratedCopy,
        created_at: NaiveDateTime,
    ) -> Self {
        let markdown_content = compose_markdown(&copy, &[], created_at);
        NewPostRecord {
            source_url,
            original_content,
            instructions,
            post_body: copy.post,
            summary: copy.summary,
            rationale: copy.rationale,
            markdown_content,
            images_pending: true,
            created_at,
        }
    }
}

/// Columns touched by image work. `None` is written as NULL.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = crate::schema::generated_posts)]
#[diesel(treat_none_as_null = true)]
pub struct ImageChanges<'a> {
    pub image_url_1: Option<&'a str>,
    pub image_prompt_1: Option<&'a str>,
    pub image_url_2: Option<&'a str>,
    pub image_prompt_2: Option<&'a str>,
    pub markdown_content: &'a str,
    pub images_pending: bool,
    pub images_completed_at: Option<NaiveDateTime>,
}

impl<'a> From<&'a PostRecord> for ImageChanges<'a> {
    fn from(record: &'a PostRecord) -> Self {
        ImageChanges {
            image_url_1: record.image_url_1.as_deref(),
            image_prompt_1: record.image_prompt_1.as_deref(),
            image_url_2: record.image_url_2.as_deref(),
            image_prompt_2: record.image_prompt_2.as_deref(),
            markdown_content: &record.markdown_content,
            images_pending: record.images_pending,
            images_completed_at: record.images_completed_at,
        }
    }
}

/// The three text fields produced by the text generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratedCopy {
    pub post: String,
    pub summary: String,
    pub rationale: String,
}

/// One of the two image positions on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    First,
    Second,
}

impl ImageSlot {
    pub const ALL: [ImageSlot; 2] = [ImageSlot::First, ImageSlot::Second];

    pub fn index(self) -> usize {
        match self {
            ImageSlot::First => 0,
            ImageSlot::Second => 1,
        }
    }

    /// 1-based number used on the wire and in file names.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Model used for this slot by the background job.
    pub fn default_model(self) -> ImageModel {
        match self {
            ImageSlot::First => ImageModel::Nova,
            ImageSlot::Second => ImageModel::Titan,
        }
    }
}

impl TryFrom<i64> for ImageSlot {
    type Error = ValidationError;

    fn try_from(number: i64) -> Result<Self, Self::Error> {
        match number {
            1 => Ok(ImageSlot::First),
            2 => Ok(ImageSlot::Second),
            other => Err(ValidationError::InvalidImageNumber(other)),
        }
    }
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageModel {
    Nova,
    Titan,
}

impl ImageModel {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageModel::Nova => "nova",
            ImageModel::Titan => "titan",
        }
    }
}

impl FromStr for ImageModel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "nova" => Ok(ImageModel::Nova),
            "titan" => Ok(ImageModel::Titan),
            other => Err(ValidationError::UnknownModel(other.to_string())),
        }
    }
}

impl fmt::Display for ImageModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored image and the prompt that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRef {
    pub url: String,
    pub prompt: String,
}

/// Changes to apply to a record's image columns in one write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageUpdate {
    /// Slots to overwrite; `None` leaves the slot as it is.
    pub slots: [Option<ImageRef>; 2],
    /// Whether this write ends the pending image work.
    pub finish: bool,
}

impl ImageUpdate {
    pub fn single(slot: ImageSlot, image: ImageRef) -> Self {
        let mut update = ImageUpdate::default();
        update.slots[slot.index()] = Some(image);
        update
    }

    pub fn populated(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

impl PostRecord {
    pub fn copy(&self) -> GeneratedCopy {
        GeneratedCopy {
            post: self.post_body.clone(),
            summary: self.summary.clone(),
            rationale: self.rationale.clone(),
        }
    }

    pub fn image(&self, slot: ImageSlot) -> Option<ImageRef> {
        let (url, prompt) = match slot {
            ImageSlot::First => (&self.image_url_1, &self.image_prompt_1),
            ImageSlot::Second => (&self.image_url_2, &self.image_prompt_2),
        };
        Some(ImageRef {
            url: url.clone()?,
            prompt: prompt.clone().unwrap_or_default(),
        })
    }

    /// Non-empty image URLs in slot order.
    pub fn image_urls(&self) -> Vec<&str> {
        [&self.image_url_1, &self.image_url_2]
            .into_iter()
            .filter_map(|url| url.as_deref())
            .filter(|url| !url.is_empty())
            .collect()
    }

    fn set_image(&mut self, slot: ImageSlot, image: ImageRef) {
        let (url, prompt) = match slot {
            ImageSlot::First => (&mut self.image_url_1, &mut self.image_prompt_1),
            ImageSlot::Second => (&mut self.image_url_2, &mut self.image_prompt_2),
        };
        *url = Some(image.url);
        *prompt = Some(image.prompt);
    }

    /// Applies `update` at time `now`.
    ///
    /// The markdown document is rebuilt from the resulting snapshot whenever a
    /// slot changed and at least one URL is present. Finishing clears the
    /// pending flag and stamps the completion time the first time it happens.
    pub fn apply_image_update(&mut self, update: ImageUpdate, now: NaiveDateTime) {
        let mut changed = false;
        for (slot, image) in ImageSlot::ALL.into_iter().zip(update.slots) {
            if let Some(image) = image {
                self.set_image(slot, image);
                changed = true;
            }
        }

        if changed && !self.image_urls().is_empty() {
            self.markdown_content = compose_markdown(&self.copy(), &self.image_urls(), now);
        }

        if update.finish {
            self.mark_images_complete(now);
        }
    }

    /// Clears the pending flag; the completion time is set once and kept.
    pub fn mark_images_complete(&mut self, now: NaiveDateTime) {
        self.images_pending = false;
        if self.images_completed_at.is_none() {
            self.images_completed_at = Some(now);
        }
    }
}
