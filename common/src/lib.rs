// Re-export models
pub use crate::models::*;

pub mod models;
pub mod utils;

/// Cache tag covering every story listing.
pub const STORIES_TAG: &str = "stories";

pub fn story_tag(slug: &str) -> String {
    format!("story-{slug}")
}

pub fn chapter_tag(slug: &str, index: i64) -> String {
    format!("chapter-{slug}-{index}")
}
