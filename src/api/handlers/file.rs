use crate::api::types::{AppError, AppState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use truyen_common::utils::mime::detect_mime_type;
use truyen_storage::ObjectStoreError;

/// Serves objects written by the local backend under their public URL.
pub async fn get_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    match state.objects.get(&key).await {
        Ok(Some(data)) => {
            let mime_type = detect_mime_type(&data);
            tracing::debug!("Serving {}: {} bytes, type: {}", key, data.len(), mime_type);

            Ok((
                [
                    (header::CONTENT_TYPE, mime_type),
                    (header::CACHE_CONTROL, "public, max-age=31536000"),
                ],
                Body::from(data),
            )
                .into_response())
        }
        Ok(None) | Err(ObjectStoreError::InvalidKey(_)) => {
            Err(AppError::NotFound("Không tìm thấy ảnh".to_string()))
        }
        Err(e) => {
            tracing::error!("Failed to read object {}: {:?}", key, e);
            Err(AppError::InternalServerError(
                "Đã xảy ra lỗi khi tải ảnh".to_string(),
            ))
        }
    }
}
