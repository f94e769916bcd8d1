use super::handlers::{chapter, file, story};
use super::types::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stories", get(story::list_stories).post(story::create_story))
        .route("/stories/mine", get(story::my_stories))
        .route("/stories/random", get(story::random_stories))
        .route("/stories/recent", get(story::recent_stories))
        .route("/stories/top", get(story::top_stories))
        .route("/stories/:slug", get(story::get_story))
        .route("/stories/:slug/chapters/:index", get(chapter::get_chapter))
        .route("/chapters", post(chapter::create_chapter))
        .route("/files/*key", get(file::get_file))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::UploadSettings;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use truyen_storage::{LocalObjectStore, NewStory, Storage, TaggedCache};

    const BOUNDARY: &str = "truyen-test-boundary";
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a str, &'a [u8]),
    }

    fn multipart(parts: &[Part]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                            .as_bytes(),
                    );
                }
                Part::File(name, filename, content_type, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn post_form(uri: &str, parts: &[Part], token: Option<&str>) -> Request<Body> {
        let mut builder = Request::post(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(multipart(parts))).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn app(tmp: &tempfile::TempDir) -> (Router, Storage) {
        let storage = Storage::in_memory().await.unwrap();
        let objects = LocalObjectStore::new(tmp.path(), "http://localhost:3000/files")
            .await
            .unwrap();
        let state = AppState::new(
            storage.clone(),
            Arc::new(objects),
            TaggedCache::new(100, Duration::from_secs(3600)),
            UploadSettings {
                normalize: None,
                max_file_bytes: 1024 * 1024,
            },
        );
        (create_router(state, 10 * 1024 * 1024), storage)
    }

    async fn seed_story(storage: &Storage, slug: &str) {
        storage
            .create_story(NewStory {
                slug: slug.to_string(),
                title: slug.to_string(),
                author: None,
                status: None,
                genres: None,
                description: None,
                thumbnail_url: None,
                creator_id: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn health_check_responds() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (router, _) = app(&tmp).await;

        let response = router.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_story_is_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (router, _) = app(&tmp).await;

        let response = router.oneshot(get("/stories/naruto")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["success"], false);
    }

    #[tokio::test]
    async fn chapter_upload_is_readable_end_to_end() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (router, storage) = app(&tmp).await;
        seed_story(&storage, "one-piece").await;

        // Warm the cache so the upload has something to invalidate.
        let warm = router.clone().oneshot(get("/stories/one-piece")).await.unwrap();
        assert!(json(warm).await["chapters"].as_array().unwrap().is_empty());

        let request = post_form(
            "/chapters",
            &[
                Part::Text("storySlug", "one-piece"),
                Part::File("images", "p1.jpg", "image/jpeg", JPEG),
                Part::File("images", "p2.jpg", "image/jpeg", JPEG),
                Part::File("images", "p3.jpg", "image/jpeg", JPEG),
            ],
            None,
        );
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["chapterNumber"], 1);
        assert!(body["chapterNumber"].is_i64());
        assert_eq!(body["pageCount"], 3);

        let story = json(router.clone().oneshot(get("/stories/one-piece")).await.unwrap()).await;
        assert_eq!(story["chapters"].as_array().unwrap().len(), 1);
        assert!(story["chapters"][0]["chapterNumber"].is_i64());

        let reading = json(
            router
                .clone()
                .oneshot(get("/stories/one-piece/chapters/1"))
                .await
                .unwrap(),
        )
        .await;
        let pages = reading["pages"].as_array().unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(
            pages[2]["imageUrl"],
            "http://localhost:3000/files/stories/one-piece/chapters/1/page_3.jpg"
        );

        let image = router
            .oneshot(get("/files/stories/one-piece/chapters/1/page_3.jpg"))
            .await
            .unwrap();
        assert_eq!(image.status(), StatusCode::OK);
        assert_eq!(image.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(to_bytes(image.into_body(), usize::MAX).await.unwrap(), JPEG);
    }

    #[tokio::test]
    async fn out_of_range_chapter_index_is_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (router, storage) = app(&tmp).await;
        seed_story(&storage, "one-piece").await;

        for index in ["0", "-9223372036854775808", "9223372036854775807"] {
            let uri = format!("/stories/one-piece/chapters/{index}");
            let response = router.clone().oneshot(get(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "index {index}");
        }
    }

    #[tokio::test]
    async fn non_image_upload_is_a_bad_request() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (router, storage) = app(&tmp).await;
        seed_story(&storage, "one-piece").await;

        let request = post_form(
            "/chapters",
            &[
                Part::Text("storySlug", "one-piece"),
                Part::File("images", "notes.txt", "text/plain", b"hello"),
            ],
            None,
        );
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!tmp.path().join("stories").exists());
    }

    #[tokio::test]
    async fn publishing_requires_a_session() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (router, storage) = app(&tmp).await;
        let user = storage.upsert_user("author@example.com", None, None).await.unwrap();
        let expires = chrono::Utc::now().timestamp() + 3600;
        storage.create_session("token-1", &user.id, expires).await.unwrap();

        let parts = [
            Part::Text("title", "Thám Tử Conan"),
            Part::Text("author", "Aoyama Gosho"),
            Part::Text("status", "Đang tiến hành"),
            Part::Text("genres", "Bí ẩn"),
            Part::File("thumbnail", "cover.png", "image/png", JPEG),
        ];

        let anonymous = router.clone().oneshot(post_form("/stories", &parts, None)).await.unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let created = router
            .clone()
            .oneshot(post_form("/stories", &parts, Some("token-1")))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        assert_eq!(json(created).await["slug"], "tham-tu-conan");
        assert!(tmp.path().join("stories/tham-tu-conan/thumbnail.png").exists());

        let duplicate = router
            .clone()
            .oneshot(post_form("/stories", &parts, Some("token-1")))
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let mine = router
            .oneshot(
                Request::get("/stories/mine")
                    .header(header::AUTHORIZATION, "Bearer token-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let mine = json(mine).await;
        assert_eq!(mine.as_array().unwrap().len(), 1);
        assert_eq!(mine[0]["chapterCount"], 0);
    }
}
