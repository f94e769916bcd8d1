use anyhow::Result;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::str::FromStr;
use truyen_common::models;

pub mod cache;
pub mod objects;

pub use cache::TaggedCache;
pub use objects::{LocalObjectStore, ObjectStore, ObjectStoreError, S3Config, S3ObjectStore};

#[derive(Clone)]
pub struct Storage {
    pub pool: Pool<Sqlite>,
}

pub struct NewStory {
    pub slug: String,
    pub title: String,
    pub author: Option<String>,
    pub status: Option<String>,
    pub genres: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub creator_id: Option<String>,
}

const SUMMARY_SELECT: &str = "SELECT s.id, s.slug, s.title, s.author, s.status, s.genres, s.thumbnail_url, s.created_at,
        COUNT(c.id) AS chapter_count,
        COALESCE(MAX(c.created_at), s.created_at) AS latest_update
    FROM stories s LEFT JOIN chapters c ON c.story_slug = s.slug";

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

impl Storage {
    /// Opens (creating if needed) the database at `database_url` and makes
    /// sure the schema exists.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    /// A private in-memory database. A single long-lived connection keeps the
    /// data alive for the lifetime of the pool.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<()> {
        // Auth provider tables
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT,
                email TEXT NOT NULL UNIQUE,
                email_verified INTEGER,
                image TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS accounts (
                user_id TEXT NOT NULL,
                type TEXT NOT NULL,
                provider TEXT NOT NULL,
                provider_account_id TEXT NOT NULL,
                refresh_token TEXT,
                access_token TEXT,
                expires_at INTEGER,
                token_type TEXT,
                scope TEXT,
                id_token TEXT,
                session_state TEXT,
                PRIMARY KEY (provider, provider_account_id),
                FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires INTEGER NOT NULL,
                FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS verification_tokens (
                identifier TEXT NOT NULL,
                token TEXT NOT NULL,
                expires INTEGER NOT NULL,
                PRIMARY KEY (identifier, token)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS stories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                author TEXT,
                status TEXT,
                genres TEXT,
                description TEXT,
                thumbnail_url TEXT,
                creator_id TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY(creator_id) REFERENCES users(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        // Chapter numbers are not unique per story: the count + 1 rule is the
        // only thing assigning them.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chapters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                story_slug TEXT NOT NULL,
                chapter_number REAL NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY(story_slug) REFERENCES stories(slug)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chapter_pages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chapter_id INTEGER NOT NULL,
                image_url TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                FOREIGN KEY(chapter_id) REFERENCES chapters(id)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// True when `err` comes from a UNIQUE constraint, such as a taken story slug.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db| db.is_unique_violation())
}

// Stories
impl Storage {
    pub async fn create_story(&self, story: NewStory) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO stories (slug, title, author, status, genres, description, thumbnail_url, creator_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&story.slug)
        .bind(&story.title)
        .bind(&story.author)
        .bind(&story.status)
        .bind(&story.genres)
        .bind(&story.description)
        .bind(&story.thumbnail_url)
        .bind(&story.creator_id)
        .bind(now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let exists = sqlx::query("SELECT 1 FROM stories WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(exists.is_some())
    }

    pub async fn get_story(&self, slug: &str) -> Result<Option<models::Story>> {
        let story = sqlx::query_as::<_, models::Story>("SELECT * FROM stories WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(story)
    }

    pub async fn list_stories(&self) -> Result<Vec<models::Story>> {
        let stories = sqlx::query_as::<_, models::Story>(
            "SELECT * FROM stories ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(stories)
    }

    pub async fn random_stories(&self, limit: i64) -> Result<Vec<models::StorySummary>> {
        let stories = sqlx::query_as::<_, models::StorySummary>(&format!(
            "{SUMMARY_SELECT} GROUP BY s.id ORDER BY RANDOM() LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(stories)
    }

    /// Stories ordered by their latest chapter upload. Stories without any
    /// chapter rank by their own creation time.
    pub async fn recently_updated_stories(&self, limit: i64) -> Result<Vec<models::StorySummary>> {
        let stories = sqlx::query_as::<_, models::StorySummary>(&format!(
            "{SUMMARY_SELECT} GROUP BY s.id ORDER BY latest_update DESC, s.id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(stories)
    }

    /// Chapter count stands in for popularity.
    pub async fn top_stories(&self, limit: i64) -> Result<Vec<models::StorySummary>> {
        let stories = sqlx::query_as::<_, models::StorySummary>(&format!(
            "{SUMMARY_SELECT} GROUP BY s.id ORDER BY chapter_count DESC, s.created_at DESC, s.id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(stories)
    }

    pub async fn stories_by_creator(&self, user_id: &str) -> Result<Vec<models::StorySummary>> {
        let stories = sqlx::query_as::<_, models::StorySummary>(&format!(
            "{SUMMARY_SELECT} WHERE s.creator_id = ? GROUP BY s.id ORDER BY s.created_at DESC, s.id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(stories)
    }
}

// Chapters
impl Storage {
    pub async fn count_chapters(&self, story_slug: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chapters WHERE story_slug = ?")
            .bind(story_slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn list_chapters(&self, story_slug: &str) -> Result<Vec<models::Chapter>> {
        let chapters = sqlx::query_as::<_, models::Chapter>(
            "SELECT * FROM chapters WHERE story_slug = ? ORDER BY chapter_number ASC, id ASC",
        )
        .bind(story_slug)
        .fetch_all(&self.pool)
        .await?;
        Ok(chapters)
    }

    /// Inserts one chapter row and its page rows in a single transaction.
    /// Page numbers follow the order of `image_urls`, starting at 1.
    pub async fn insert_chapter_with_pages(
        &self,
        story_slug: &str,
        chapter_number: f64,
        image_urls: &[String],
    ) -> Result<models::Chapter> {
        let created_at = now();
        let mut tx = self.pool.begin().await?;

        let chapter_id = sqlx::query(
            "INSERT INTO chapters (story_slug, chapter_number, created_at) VALUES (?, ?, ?)",
        )
        .bind(story_slug)
        .bind(chapter_number)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        if !image_urls.is_empty() {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO chapter_pages (chapter_id, image_url, page_number) ");
            builder.push_values(image_urls.iter().enumerate(), |mut row, (i, url)| {
                row.push_bind(chapter_id)
                    .push_bind(url.clone())
                    .push_bind(i as i64 + 1);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        Ok(models::Chapter {
            id: chapter_id,
            story_slug: story_slug.to_string(),
            chapter_number,
            created_at,
        })
    }

    pub async fn list_pages(&self, chapter_id: i64) -> Result<Vec<models::ChapterPage>> {
        let pages = sqlx::query_as::<_, models::ChapterPage>(
            "SELECT * FROM chapter_pages WHERE chapter_id = ? ORDER BY page_number ASC",
        )
        .bind(chapter_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(pages)
    }

    /// Story detail plus its chapters ordered by number.
    pub async fn get_story_details(&self, slug: &str) -> Result<Option<models::StoryDetails>> {
        let story = match self.get_story(slug).await? {
            Some(s) => s,
            None => return Ok(None),
        };

        let chapters = self
            .list_chapters(&story.slug)
            .await?
            .into_iter()
            .map(|c| models::ChapterRef {
                id: c.id,
                chapter_number: c.chapter_number,
            })
            .collect();

        Ok(Some(models::StoryDetails { story, chapters }))
    }

    /// The `index`-th chapter (1-based) of the story's ordered chapter list,
    /// with its pages.
    pub async fn chapter_by_index(
        &self,
        story_slug: &str,
        index: i64,
    ) -> Result<Option<models::ChapterReading>> {
        let chapters = self.list_chapters(story_slug).await?;
        let total_chapters = chapters.len() as i64;

        let position = index
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok());
        let chapter = match position.and_then(|i| chapters.get(i)) {
            Some(c) => c,
            None => return Ok(None),
        };

        let pages = self
            .list_pages(chapter.id)
            .await?
            .into_iter()
            .map(|p| models::PageRef {
                id: p.id,
                page_number: p.page_number,
                image_url: p.image_url,
            })
            .collect();

        Ok(Some(models::ChapterReading {
            chapter: models::ChapterRef {
                id: chapter.id,
                chapter_number: chapter.chapter_number,
            },
            pages,
            total_chapters,
        }))
    }
}

// Users and sessions, written by the external auth provider.
impl Storage {
    /// Returns the user with this email, creating it when missing.
    pub async fn upsert_user(
        &self,
        email: &str,
        name: Option<&str>,
        image: Option<&str>,
    ) -> Result<models::User> {
        let existing = sqlx::query_as::<_, models::User>(
            "SELECT id, name, email, image FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(user) = existing {
            return Ok(user);
        }

        let user = models::User {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.map(str::to_string),
            email: email.to_string(),
            image: image.map(str::to_string),
        };

        sqlx::query("INSERT INTO users (id, name, email, image) VALUES (?, ?, ?, ?)")
            .bind(&user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.image)
            .execute(&self.pool)
            .await?;

        tracing::info!("Created user {} ({})", user.email, user.id);
        Ok(user)
    }

    pub async fn create_session(&self, token: &str, user_id: &str, expires: i64) -> Result<()> {
        sqlx::query("INSERT INTO sessions (session_token, user_id, expires) VALUES (?, ?, ?)")
            .bind(token)
            .bind(user_id)
            .bind(expires)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Resolves a live session token to its user. Expired sessions resolve to `None`.
    pub async fn find_session_user(&self, token: &str) -> Result<Option<models::User>> {
        let user = sqlx::query_as::<_, models::User>(
            "SELECT u.id, u.name, u.email, u.image
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.session_token = ? AND s.expires > ?",
        )
        .bind(token)
        .bind(chrono::Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_story(slug: &str, creator: Option<&str>) -> NewStory {
        NewStory {
            slug: slug.to_string(),
            title: slug.replace('-', " "),
            author: Some("Oda".to_string()),
            status: Some("Đang tiến hành".to_string()),
            genres: Some("Hành động,Phiêu lưu".to_string()),
            description: None,
            thumbnail_url: None,
            creator_id: creator.map(str::to_string),
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("https://cdn.example/page_{i}.jpg")).collect()
    }

    #[tokio::test]
    async fn story_slug_is_unique() {
        let storage = Storage::in_memory().await.unwrap();
        storage.create_story(new_story("one-piece", None)).await.unwrap();

        assert!(storage.slug_exists("one-piece").await.unwrap());
        assert!(!storage.slug_exists("naruto").await.unwrap());
        let err = storage.create_story(new_story("one-piece", None)).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn chapter_pages_follow_upload_order() {
        let storage = Storage::in_memory().await.unwrap();
        storage.create_story(new_story("one-piece", None)).await.unwrap();

        let chapter = storage
            .insert_chapter_with_pages("one-piece", 1.0, &urls(3))
            .await
            .unwrap();
        let pages = storage.list_pages(chapter.id).await.unwrap();

        assert_eq!(pages.len(), 3);
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(page.page_number, i as i64 + 1);
            assert_eq!(page.image_url, format!("https://cdn.example/page_{}.jpg", i + 1));
        }
        assert_eq!(storage.count_chapters("one-piece").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_chapter_numbers_are_not_rejected() {
        let storage = Storage::in_memory().await.unwrap();
        storage.create_story(new_story("conan", None)).await.unwrap();

        storage.insert_chapter_with_pages("conan", 1.0, &urls(1)).await.unwrap();
        storage.insert_chapter_with_pages("conan", 1.0, &urls(1)).await.unwrap();

        assert_eq!(storage.count_chapters("conan").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn chapter_by_index_is_one_based() {
        let storage = Storage::in_memory().await.unwrap();
        storage.create_story(new_story("conan", None)).await.unwrap();
        storage.insert_chapter_with_pages("conan", 2.0, &urls(2)).await.unwrap();
        storage.insert_chapter_with_pages("conan", 1.0, &urls(1)).await.unwrap();

        let first = storage.chapter_by_index("conan", 1).await.unwrap().unwrap();
        assert_eq!(first.chapter.chapter_number, 1.0);
        assert_eq!(first.pages.len(), 1);
        assert_eq!(first.total_chapters, 2);

        let second = storage.chapter_by_index("conan", 2).await.unwrap().unwrap();
        assert_eq!(second.chapter.chapter_number, 2.0);
        assert_eq!(second.pages.len(), 2);

        assert!(storage.chapter_by_index("conan", 0).await.unwrap().is_none());
        assert!(storage.chapter_by_index("conan", 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chapter_by_index_handles_extreme_indices() {
        let storage = Storage::in_memory().await.unwrap();
        storage.create_story(new_story("conan", None)).await.unwrap();
        storage.insert_chapter_with_pages("conan", 1.0, &urls(1)).await.unwrap();

        for index in [i64::MIN, -1, i64::MAX] {
            assert!(
                storage.chapter_by_index("conan", index).await.unwrap().is_none(),
                "index {index}"
            );
        }
    }

    #[tokio::test]
    async fn story_details_list_chapters_in_order() {
        let storage = Storage::in_memory().await.unwrap();
        storage.create_story(new_story("conan", None)).await.unwrap();
        storage.insert_chapter_with_pages("conan", 1.0, &urls(1)).await.unwrap();
        storage.insert_chapter_with_pages("conan", 2.0, &urls(1)).await.unwrap();

        let details = storage.get_story_details("conan").await.unwrap().unwrap();
        let numbers: Vec<f64> = details.chapters.iter().map(|c| c.chapter_number).collect();
        assert_eq!(numbers, vec![1.0, 2.0]);
        assert!(storage.get_story_details("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn top_stories_rank_by_chapter_count() {
        let storage = Storage::in_memory().await.unwrap();
        for slug in ["a", "b", "c"] {
            storage.create_story(new_story(slug, None)).await.unwrap();
        }
        storage.insert_chapter_with_pages("b", 1.0, &urls(1)).await.unwrap();
        storage.insert_chapter_with_pages("b", 2.0, &urls(1)).await.unwrap();
        storage.insert_chapter_with_pages("c", 1.0, &urls(1)).await.unwrap();

        let top = storage.top_stories(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].slug, "b");
        assert_eq!(top[0].chapter_count, 2);
        assert_eq!(top[1].slug, "c");

        let recent = storage.recently_updated_stories(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].slug, "c");

        let random = storage.random_stories(10).await.unwrap();
        assert_eq!(random.len(), 3);
    }

    #[tokio::test]
    async fn sessions_resolve_to_users_until_expiry() {
        let storage = Storage::in_memory().await.unwrap();
        let user = storage
            .upsert_user("reader@example.com", Some("Reader"), None)
            .await
            .unwrap();
        let again = storage.upsert_user("reader@example.com", None, None).await.unwrap();
        assert_eq!(user.id, again.id);

        let tomorrow = chrono::Utc::now().timestamp() + 86_400;
        storage.create_session("live", &user.id, tomorrow).await.unwrap();
        storage.create_session("stale", &user.id, 1).await.unwrap();

        assert_eq!(storage.find_session_user("live").await.unwrap(), Some(user));
        assert!(storage.find_session_user("stale").await.unwrap().is_none());
        assert!(storage.find_session_user("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stories_by_creator_counts_chapters() {
        let storage = Storage::in_memory().await.unwrap();
        let user = storage.upsert_user("author@example.com", None, None).await.unwrap();
        storage.create_story(new_story("mine", Some(&user.id))).await.unwrap();
        storage.create_story(new_story("theirs", None)).await.unwrap();
        storage.insert_chapter_with_pages("mine", 1.0, &urls(2)).await.unwrap();

        let mine = storage.stories_by_creator(&user.id).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].slug, "mine");
        assert_eq!(mine[0].chapter_count, 1);
    }
}
