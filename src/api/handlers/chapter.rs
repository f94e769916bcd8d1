use super::{read_file, read_text};
use crate::api::types::{AppError, AppState};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use truyen_common::models;

pub async fn get_chapter(
    State(state): State<AppState>,
    Path((slug, index)): Path<(String, i64)>,
) -> Result<Json<models::ChapterReading>, AppError> {
    match state.catalog.chapter(&slug, index).await {
        Ok(Some(chapter)) => Ok(Json(chapter)),
        Ok(None) => Err(AppError::NotFound("Không tìm thấy chương".to_string())),
        Err(e) => {
            tracing::error!("Failed to get chapter {} of {}: {:?}", index, slug, e);
            Err(AppError::InternalServerError(
                "Đã xảy ra lỗi khi tải chương".to_string(),
            ))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterCreated {
    pub success: bool,
    pub message: String,
    pub chapter_id: i64,
    #[serde(serialize_with = "models::serialize_chapter_number")]
    pub chapter_number: f64,
    pub page_count: usize,
}

/// Multipart form with a `storySlug` field and one or more `images` files,
/// in page order.
pub async fn create_chapter(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ChapterCreated>), AppError> {
    let mut story_slug = String::new();
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Dữ liệu gửi lên không hợp lệ: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "storySlug" => story_slug = read_text(field).await?,
            "images" | "images[]" => images.push(read_file(field).await?),
            _ => {}
        }
    }

    tracing::info!(
        "Upload chapter request for {}: {} images ({})",
        story_slug,
        images.len(),
        images
            .iter()
            .map(|f| format!("{}: {:.2}KB", f.filename, f.data.len() as f64 / 1024.0))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let chapter = state.ingestor.ingest(&story_slug, images).await?;

    Ok((
        StatusCode::CREATED,
        Json(ChapterCreated {
            success: true,
            message: format!(
                "Đã đăng chương {} với {} trang thành công!",
                chapter.chapter_number, chapter.page_count
            ),
            chapter_id: chapter.chapter_id,
            chapter_number: chapter.chapter_number,
            page_count: chapter.page_count,
        }),
    ))
}
