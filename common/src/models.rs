use serde::{Deserialize, Serialize, Serializer};
use sqlx::FromRow;

#[derive(Debug, Serialize, Deserialize, FromRow, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub author: Option<String>,
    pub status: Option<String>,
    pub genres: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub creator_id: Option<String>,
    pub created_at: String,
}

/// Writes whole chapter numbers as integers (`3`, not `3.0`).
pub fn serialize_chapter_number<S: Serializer>(number: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        serializer.serialize_i64(*number as i64)
    } else {
        serializer.serialize_f64(*number)
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: i64,
    pub story_slug: String,
    #[serde(serialize_with = "serialize_chapter_number")]
    pub chapter_number: f64,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPage {
    pub id: i64,
    pub chapter_id: i64,
    pub image_url: String,
    pub page_number: i64,
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
}

/// A story row joined with the number of chapters it has.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorySummary {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub author: Option<String>,
    pub status: Option<String>,
    pub genres: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_at: String,
    pub chapter_count: i64,
    /// Latest chapter upload, or the story's own creation time when it has none.
    pub latest_update: String,
}

/// Listing entry for the all-stories page. Genres are split and translated.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoryListing {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub genres: Vec<String>,
    pub status: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRef {
    pub id: i64,
    #[serde(serialize_with = "serialize_chapter_number")]
    pub chapter_number: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoryDetails {
    pub story: Story,
    pub chapters: Vec<ChapterRef>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageRef {
    pub id: i64,
    pub page_number: i64,
    pub image_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterReading {
    pub chapter: ChapterRef,
    pub pages: Vec<PageRef>,
    pub total_chapters: i64,
}
