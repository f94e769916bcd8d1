pub mod chapter;
pub mod file;
pub mod story;

use crate::api::types::AppError;
use crate::upload::UploadedFile;
use axum::extract::multipart::{Field, MultipartError};

fn malformed(e: MultipartError) -> AppError {
    AppError::BadRequest(format!("Dữ liệu gửi lên không hợp lệ: {}", e))
}

pub(crate) async fn read_text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(malformed)
}

pub(crate) async fn read_file(field: Field<'_>) -> Result<UploadedFile, AppError> {
    let filename = field.file_name().unwrap_or("image").to_string();
    let content_type = field.content_type().unwrap_or_default().to_string();
    let data = field.bytes().await.map_err(malformed)?;

    Ok(UploadedFile {
        filename,
        content_type,
        data,
    })
}
