use crate::imaging::NormalizeOptions;
use bytes::Bytes;
use truyen_common::utils::{keys, mime};

/// An image file as received from a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// Bytes ready to be written to object storage, with the extension and
/// content type they should be stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    pub data: Bytes,
    pub extension: String,
    pub content_type: String,
}

impl From<&UploadedFile> for PreparedImage {
    fn from(file: &UploadedFile) -> Self {
        let extension = keys::file_extension(&file.filename);
        let content_type = if file.is_image() {
            file.content_type.clone()
        } else {
            mime::content_type_for_extension(&extension).to_string()
        };
        Self {
            data: file.data.clone(),
            extension,
            content_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Server-side normalization; `None` stores uploads as received.
    pub normalize: Option<NormalizeOptions>,
    pub max_file_bytes: usize,
}

/// Checks type and size of every file. Returns a user-facing message for the
/// first offending file.
pub fn validate_images(files: &[UploadedFile], max_file_bytes: usize) -> Result<(), String> {
    for file in files {
        if !file.is_image() {
            return Err(format!("File {} không phải là ảnh", file.filename));
        }
        if file.data.is_empty() {
            return Err(format!("File {} rỗng", file.filename));
        }
        if file.data.len() > max_file_bytes {
            return Err(format!(
                "File {} vượt quá dung lượng cho phép ({:.1} MB)",
                file.filename,
                max_file_bytes as f64 / 1024.0 / 1024.0
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content_type: &str, len: usize) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            content_type: content_type.to_string(),
            data: Bytes::from(vec![0u8; len]),
        }
    }

    #[test]
    fn rejects_non_images_and_oversized_files() {
        assert!(validate_images(&[file("a.jpg", "image/jpeg", 10)], 100).is_ok());

        let err = validate_images(&[file("a.jpg", "image/jpeg", 10), file("notes.txt", "text/plain", 10)], 100)
            .unwrap_err();
        assert!(err.contains("notes.txt"));

        assert!(validate_images(&[file("big.png", "image/png", 101)], 100).is_err());
        assert!(validate_images(&[file("empty.png", "image/png", 0)], 100).is_err());
    }

    #[test]
    fn prepared_image_keeps_declared_type() {
        let prepared = PreparedImage::from(&file("Page.PNG", "image/png", 4));
        assert_eq!(prepared.extension, "png");
        assert_eq!(prepared.content_type, "image/png");
    }
}
