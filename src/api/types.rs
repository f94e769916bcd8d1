use crate::catalog::Catalog;
use crate::ingest::{ChapterIngestor, IngestError};
use crate::publish::{PublishError, StoryPublisher};
use crate::upload::UploadSettings;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use truyen_storage::{ObjectStore, Storage, TaggedCache};

#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub objects: Arc<dyn ObjectStore>,
    pub catalog: Catalog,
    pub ingestor: ChapterIngestor,
    pub publisher: StoryPublisher,
}

impl AppState {
    pub fn new(
        storage: Storage,
        objects: Arc<dyn ObjectStore>,
        cache: TaggedCache,
        uploads: UploadSettings,
    ) -> Self {
        Self {
            catalog: Catalog::new(storage.clone(), cache.clone()),
            ingestor: ChapterIngestor::new(
                storage.clone(),
                objects.clone(),
                cache.clone(),
                uploads.clone(),
            ),
            publisher: StoryPublisher::new(storage.clone(), objects.clone(), cache, uploads),
            storage,
            objects,
        }
    }
}

// Standardized Error Response
#[derive(Debug)]
pub enum AppError {
    InternalServerError(String),
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(json!({
            "success": false,
            "message": message
        }));

        (status, body).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Validation(_) | IngestError::Imaging(_) => AppError::BadRequest(e.to_string()),
            IngestError::StoryNotFound(_) => AppError::NotFound(e.to_string()),
            IngestError::Upload(_) | IngestError::Database(_) => {
                tracing::error!("Upload chapter error: {:?}", e);
                AppError::InternalServerError("Đã xảy ra lỗi khi đăng chương".to_string())
            }
        }
    }
}

impl From<PublishError> for AppError {
    fn from(e: PublishError) -> Self {
        match e {
            PublishError::Validation(_) | PublishError::Imaging(_) => AppError::BadRequest(e.to_string()),
            PublishError::SlugTaken(_) => AppError::Conflict(e.to_string()),
            PublishError::Upload(_) | PublishError::Database(_) => {
                tracing::error!("Create story error: {:?}", e);
                AppError::InternalServerError("Đã xảy ra lỗi khi đăng truyện".to_string())
            }
        }
    }
}
