use super::{read_file, read_text};
use crate::api::types::{AppError, AppState};
use crate::auth::CurrentUser;
use crate::publish::StoryForm;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use truyen_common::models;

pub async fn list_stories(
    State(state): State<AppState>,
) -> Result<Json<Vec<models::StoryListing>>, AppError> {
    match state.catalog.all_stories().await {
        Ok(stories) => Ok(Json(stories)),
        Err(e) => {
            tracing::error!("Failed to list stories: {:?}", e);
            Err(AppError::InternalServerError(
                "Đã xảy ra lỗi khi tải danh sách truyện".to_string(),
            ))
        }
    }
}

pub async fn get_story(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<models::StoryDetails>, AppError> {
    match state.catalog.story_details(&slug).await {
        Ok(Some(story)) => Ok(Json(story)),
        Ok(None) => Err(AppError::NotFound(format!(
            "Không tìm thấy truyện với slug: {}",
            slug
        ))),
        Err(e) => {
            tracing::error!("Failed to get story {}: {:?}", slug, e);
            Err(AppError::InternalServerError(
                "Đã xảy ra lỗi khi tải truyện".to_string(),
            ))
        }
    }
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

const MAX_LIMIT: i64 = 100;

fn summaries(
    result: anyhow::Result<Vec<models::StorySummary>>,
    what: &str,
) -> Result<Json<Vec<models::StorySummary>>, AppError> {
    result.map(Json).map_err(|e| {
        tracing::error!("Failed to get {} stories: {:?}", what, e);
        AppError::InternalServerError("Đã xảy ra lỗi khi tải danh sách truyện".to_string())
    })
}

pub async fn random_stories(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<models::StorySummary>>, AppError> {
    let limit = query.limit.unwrap_or(12).clamp(1, MAX_LIMIT);
    summaries(state.storage.random_stories(limit).await, "random")
}

pub async fn recent_stories(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<models::StorySummary>>, AppError> {
    let limit = query.limit.unwrap_or(12).clamp(1, MAX_LIMIT);
    summaries(state.storage.recently_updated_stories(limit).await, "recently updated")
}

pub async fn top_stories(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<models::StorySummary>>, AppError> {
    let limit = query.limit.unwrap_or(4).clamp(1, MAX_LIMIT);
    summaries(state.storage.top_stories(limit).await, "top")
}

pub async fn my_stories(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<models::StorySummary>>, AppError> {
    summaries(state.storage.stories_by_creator(&user.id).await, "own")
}

/// Multipart publish form: `title`, `author`, `status`, `genres`,
/// optional `description` and a `thumbnail` image.
pub async fn create_story(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let mut form = StoryForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Dữ liệu gửi lên không hợp lệ: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => form.title = read_text(field).await?,
            "author" => form.author = read_text(field).await?,
            "status" => form.status = read_text(field).await?,
            "genres" => form.genres = read_text(field).await?,
            "description" => form.description = Some(read_text(field).await?),
            "thumbnail" => form.thumbnail = Some(read_file(field).await?),
            _ => {}
        }
    }

    let title = form.title.trim().to_string();
    let slug = state.publisher.publish(&user, form).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": format!("Đã đăng truyện \"{}\" thành công!", title),
            "slug": slug,
        })),
    ))
}
