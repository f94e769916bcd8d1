//! Chapter ingestion: validate the upload, number the chapter, store the pages
//! and record them.

use crate::imaging::{self, ImagingError, NormalizeOptions};
use crate::locks::KeyedLocks;
use crate::upload::{self, PreparedImage, UploadSettings, UploadedFile};
use futures::future::try_join_all;
use std::sync::Arc;
use thiserror::Error;
use truyen_common::utils::keys;
use truyen_common::{story_tag, STORIES_TAG};
use truyen_storage::{ObjectStore, ObjectStoreError, Storage, TaggedCache};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    Validation(String),

    #[error("Không tìm thấy truyện với slug: {0}")]
    StoryNotFound(String),

    #[error(transparent)]
    Imaging(#[from] ImagingError),

    #[error("upload failed: {0}")]
    Upload(#[from] ObjectStoreError),

    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestedChapter {
    pub chapter_id: i64,
    pub chapter_number: f64,
    pub page_count: usize,
}

#[derive(Clone)]
pub struct ChapterIngestor {
    storage: Storage,
    objects: Arc<dyn ObjectStore>,
    cache: TaggedCache,
    normalize: Option<NormalizeOptions>,
    max_file_bytes: usize,
    story_locks: KeyedLocks,
}

impl ChapterIngestor {
    pub fn new(
        storage: Storage,
        objects: Arc<dyn ObjectStore>,
        cache: TaggedCache,
        settings: UploadSettings,
    ) -> Self {
        Self {
            storage,
            objects,
            cache,
            normalize: settings.normalize,
            max_file_bytes: settings.max_file_bytes,
            story_locks: KeyedLocks::default(),
        }
    }

    /// Appends a chapter to `story_slug` made of `files`, in order.
    ///
    /// The chapter number is the story's current chapter count plus one.
    /// Submissions for the same story are serialized from the count through
    /// the insert, so concurrent uploads get consecutive numbers.
    pub async fn ingest(
        &self,
        story_slug: &str,
        files: Vec<UploadedFile>,
    ) -> Result<IngestedChapter, IngestError> {
        let story_slug = story_slug.trim();
        if story_slug.is_empty() || files.is_empty() {
            return Err(IngestError::Validation(
                "Thiếu thông tin: storySlug hoặc images".to_string(),
            ));
        }
        upload::validate_images(&files, self.max_file_bytes).map_err(IngestError::Validation)?;

        if self.storage.get_story(story_slug).await?.is_none() {
            return Err(IngestError::StoryNotFound(story_slug.to_string()));
        }

        let images = try_join_all(
            files
                .iter()
                .map(|f| imaging::prepare(f, self.normalize.as_ref())),
        )
        .await?;

        let guard = self.story_locks.lock(story_slug).await;

        let existing = self.storage.count_chapters(story_slug).await?;
        let chapter_number = (existing + 1) as f64;
        tracing::info!(
            "Found {} existing chapters for {}, creating chapter {}",
            existing,
            story_slug,
            chapter_number
        );

        let urls = self.upload_pages(story_slug, chapter_number, &images).await?;

        let chapter = match self
            .storage
            .insert_chapter_with_pages(story_slug, chapter_number, &urls)
            .await
        {
            Ok(chapter) => chapter,
            Err(e) => {
                tracing::warn!(
                    "Recording chapter {} of {} failed; {} uploaded pages are orphaned",
                    chapter_number,
                    story_slug,
                    urls.len()
                );
                return Err(e.into());
            }
        };
        drop(guard);

        tracing::info!(
            "Created chapter {} (id {}) with {} pages for {}",
            chapter.chapter_number,
            chapter.id,
            urls.len(),
            story_slug
        );

        self.cache.invalidate_tag(&story_tag(story_slug)).await;
        self.cache.invalidate_tag(STORIES_TAG).await;

        Ok(IngestedChapter {
            chapter_id: chapter.id,
            chapter_number: chapter.chapter_number,
            page_count: urls.len(),
        })
    }

    /// Uploads every page concurrently. The first failure fails the whole
    /// batch; pages already written stay in the bucket.
    async fn upload_pages(
        &self,
        story_slug: &str,
        chapter_number: f64,
        images: &[PreparedImage],
    ) -> Result<Vec<String>, IngestError> {
        let uploads = images.iter().enumerate().map(|(i, image)| {
            let key = keys::chapter_page_key(story_slug, chapter_number, i + 1, &image.extension);
            async move {
                self.objects
                    .put(&key, image.data.clone(), &image.content_type)
                    .await
            }
        });

        match try_join_all(uploads).await {
            Ok(urls) => Ok(urls),
            Err(e) => {
                tracing::warn!(
                    "Uploading chapter {} of {} failed, pages already stored are not removed: {}",
                    chapter_number,
                    story_slug,
                    e
                );
                Err(e.into())
            }
        }
    }
}
