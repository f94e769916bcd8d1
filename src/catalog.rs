use anyhow::Result;
use truyen_common::models::{ChapterReading, StoryDetails, StoryListing};
use truyen_common::utils::genres;
use truyen_common::{chapter_tag, story_tag, STORIES_TAG};
use truyen_storage::{Storage, TaggedCache};

/// Cached reads behind the listing, story and reader pages.
#[derive(Clone)]
pub struct Catalog {
    storage: Storage,
    cache: TaggedCache,
}

impl Catalog {
    pub fn new(storage: Storage, cache: TaggedCache) -> Self {
        Self { storage, cache }
    }

    pub async fn all_stories(&self) -> Result<Vec<StoryListing>> {
        self.cache
            .get_or_try_insert("all-stories", &[STORIES_TAG.to_string()], || async {
                let stories = self.storage.list_stories().await?;
                tracing::debug!("Loaded {} stories from database", stories.len());
                let listings = stories
                    .into_iter()
                    .map(|s| StoryListing {
                        genres: genres::split_translated(s.genres.as_deref()),
                        id: s.id,
                        slug: s.slug,
                        title: s.title,
                        author: s.author,
                        description: s.description,
                        thumbnail_url: s.thumbnail_url,
                        status: s.status,
                        created_at: s.created_at,
                    })
                    .collect::<Vec<_>>();
                Ok::<_, anyhow::Error>(listings)
            })
            .await
    }

    pub async fn story_details(&self, slug: &str) -> Result<Option<StoryDetails>> {
        let key = story_tag(slug);
        let tags = [key.clone(), STORIES_TAG.to_string()];
        self.cache
            .get_or_try_insert(&key, &tags, || self.storage.get_story_details(slug))
            .await
    }

    /// Pages of the `index`-th chapter (1-based) of a story.
    pub async fn chapter(&self, slug: &str, index: i64) -> Result<Option<ChapterReading>> {
        let key = chapter_tag(slug, index);
        let tags = [story_tag(slug), key.clone()];
        self.cache
            .get_or_try_insert(&key, &tags, || self.storage.chapter_by_index(slug, index))
            .await
    }
}
