use crate::imaging::{self, ImagingError, NormalizeOptions};
use crate::locks::KeyedLocks;
use crate::upload::{self, UploadSettings, UploadedFile};
use std::sync::Arc;
use thiserror::Error;
use truyen_common::models::User;
use truyen_common::utils::{keys, slug};
use truyen_common::STORIES_TAG;
use truyen_storage::{
    is_unique_violation, NewStory, ObjectStore, ObjectStoreError, Storage, TaggedCache,
};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{0}")]
    Validation(String),

    #[error("Truyện với tên \"{0}\" đã tồn tại. Vui lòng chọn tên khác.")]
    SlugTaken(String),

    #[error(transparent)]
    Imaging(#[from] ImagingError),

    #[error("upload failed: {0}")]
    Upload(#[from] ObjectStoreError),

    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}

/// Fields of the publish form.
#[derive(Debug, Default)]
pub struct StoryForm {
    pub title: String,
    pub author: String,
    pub status: String,
    pub genres: String,
    pub description: Option<String>,
    pub thumbnail: Option<UploadedFile>,
}

#[derive(Clone)]
pub struct StoryPublisher {
    storage: Storage,
    objects: Arc<dyn ObjectStore>,
    cache: TaggedCache,
    normalize: Option<NormalizeOptions>,
    max_file_bytes: usize,
    slug_locks: KeyedLocks,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl StoryPublisher {
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
            slug_locks: KeyedLocks::default(),
        }
    }

    /// Creates a story owned by `creator` and returns its slug. A title whose
    /// slug is already taken is rejected.
    pub async fn publish(&self, creator: &User, form: StoryForm) -> Result<String, PublishError> {
        let (Some(title), Some(author), Some(status), Some(genres)) = (
            non_empty(&form.title),
            non_empty(&form.author),
            non_empty(&form.status),
            non_empty(&form.genres),
        ) else {
            return Err(PublishError::Validation(
                "Vui lòng điền đầy đủ thông tin bắt buộc".to_string(),
            ));
        };

        let thumbnail = match form.thumbnail {
            Some(file) if !file.data.is_empty() => file,
            _ => {
                return Err(PublishError::Validation(
                    "Vui lòng chọn ảnh đại diện truyện".to_string(),
                ))
            }
        };
        upload::validate_images(std::slice::from_ref(&thumbnail), self.max_file_bytes)
            .map_err(PublishError::Validation)?;

        let slug = slug::to_slug(&title);
        if slug.is_empty() {
            return Err(PublishError::Validation(format!(
                "Tên truyện \"{title}\" không tạo được đường dẫn hợp lệ"
            )));
        }
        // One publish per slug at a time, from the existence check to the insert.
        let _claim = self.slug_locks.lock(&slug).await;
        if self.storage.slug_exists(&slug).await? {
            return Err(PublishError::SlugTaken(title));
        }

        let image = imaging::prepare(&thumbnail, self.normalize.as_ref()).await?;
        let key = keys::thumbnail_key(&slug, &image.extension);
        let thumbnail_url = self.objects.put(&key, image.data, &image.content_type).await?;
        tracing::info!("Thumbnail for {} stored at {}", slug, thumbnail_url);

        let created = self
            .storage
            .create_story(NewStory {
                slug: slug.clone(),
                title: title.clone(),
                author: Some(author),
                status: Some(status),
                genres: Some(genres),
                description: form.description.as_deref().and_then(non_empty),
                thumbnail_url: Some(thumbnail_url),
                creator_id: Some(creator.id.clone()),
            })
            .await;
        let id = match created {
            Ok(id) => id,
            Err(e) if is_unique_violation(&e) => return Err(PublishError::SlugTaken(title)),
            Err(e) => return Err(e.into()),
        };
        tracing::info!("Published story {} (id {}) for {}", slug, id, creator.email);

        self.cache.invalidate_tag(STORIES_TAG).await;
        Ok(slug)
    }
}
