//! Blob storage for story thumbnails and chapter pages.
//!
//! Objects are addressed by hierarchical keys such as
//! `stories/{slug}/chapters/{n}/page_{i}.{ext}`. Every backend resolves a key
//! to a public URL under its configured base.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, PutOptions, PutPayload};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("object storage is not configured: {0}")]
    Config(String),

    #[error("object storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("object storage backend failed: {0}")]
    Backend(#[from] object_store::Error),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `data` under `key` and returns its public URL.
    async fn put(&self, key: &str, data: Bytes, content_type: &str)
        -> Result<String, ObjectStoreError>;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, ObjectStoreError>;

    fn public_url(&self, key: &str) -> String;
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    let bad_segment = key
        .split('/')
        .any(|s| s.is_empty() || s == "." || s == "..");
    if key.is_empty() || key.contains('\\') || bad_segment {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Files under a local directory, served back by the HTTP layer.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base: String,
}

impl LocalObjectStore {
    pub async fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Result<Self, ObjectStoreError> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root).await?;
        }
        Ok(Self {
            root,
            public_base: public_base.into(),
        })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> Result<String, ObjectStoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&path, &data).await?;
        tracing::debug!("Stored {} ({} bytes) at {:?}", key, data.len(), path);
        Ok(self.public_url(key))
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, ObjectStoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base, key)
    }
}

/// Credentials and addressing for an S3-compatible bucket (Cloudflare R2).
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub account_id: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket: Option<String>,
    pub public_domain: Option<String>,
}

fn required(value: &Option<String>, name: &str) -> Result<String, ObjectStoreError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ObjectStoreError::Config(format!("{name} is not set")))
}

pub struct S3ObjectStore {
    inner: AmazonS3,
    public_base: String,
}

impl S3ObjectStore {
    pub fn new(config: &S3Config) -> Result<Self, ObjectStoreError> {
        let account_id = required(&config.account_id, "R2_ACCOUNT_ID")?;
        let access_key_id = required(&config.access_key_id, "R2_ACCESS_KEY_ID")?;
        let secret_access_key = required(&config.secret_access_key, "R2_SECRET_ACCESS_KEY")?;
        let bucket = required(&config.bucket, "R2_BUCKET_NAME")?;

        let inner = AmazonS3Builder::new()
            .with_endpoint(format!("https://{account_id}.r2.cloudflarestorage.com"))
            .with_region("auto")
            .with_bucket_name(bucket)
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key)
            .build()?;

        Ok(Self {
            inner,
            public_base: config.public_domain.clone().unwrap_or_default(),
        })
    }

    fn object_path(key: &str) -> Result<ObjectPath, ObjectStoreError> {
        validate_key(key)?;
        ObjectPath::parse(key).map_err(|e| ObjectStoreError::InvalidKey(e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<String, ObjectStoreError> {
        use object_store::ObjectStore as _;

        let path = Self::object_path(key)?;
        let size = data.len();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.inner
            .put_opts(&path, PutPayload::from(data), options)
            .await?;

        let url = self.public_url(key);
        tracing::info!("Uploaded {} ({:.2} KB) to {}", key, size as f64 / 1024.0, url);
        Ok(url)
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, ObjectStoreError> {
        use object_store::ObjectStore as _;

        let path = Self::object_path(key)?;
        match self.inner.get(&path).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base, key)
    }
}
