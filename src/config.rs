use crate::imaging::{NormalizeOptions, OutputFormat};
use crate::upload::UploadSettings;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use truyen_storage::S3Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Files under the data directory, served by this process
    Local,
    /// S3-compatible bucket (Cloudflare R2)
    S3,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Path to data directory
    #[arg(short, long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Database URL. Defaults to a SQLite file inside the data directory
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Where uploaded images are stored
    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value_t = StorageBackend::Local)]
    pub storage_backend: StorageBackend,

    /// Base URL of objects in the local backend. Defaults to this server's /files route
    #[arg(long, env = "PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    #[arg(long, env = "R2_ACCOUNT_ID")]
    pub r2_account_id: Option<String>,

    #[arg(long, env = "R2_ACCESS_KEY_ID", hide_env_values = true)]
    pub r2_access_key_id: Option<String>,

    #[arg(long, env = "R2_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub r2_secret_access_key: Option<String>,

    #[arg(long, env = "R2_BUCKET_NAME")]
    pub r2_bucket_name: Option<String>,

    /// Public domain objects in the bucket are served from
    #[arg(long, env = "R2_PUBLIC_DOMAIN")]
    pub r2_public_domain: Option<String>,

    /// Lifetime of cached reads, in seconds
    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 3600)]
    pub cache_ttl_secs: u64,

    #[arg(long, env = "CACHE_CAPACITY", default_value_t = 10_000)]
    pub cache_capacity: u64,

    /// Re-encode uploaded images on the server
    #[arg(long, env = "NORMALIZE_IMAGES")]
    pub normalize_images: bool,

    #[arg(long, env = "IMAGE_MAX_BYTES", default_value_t = 800 * 1024)]
    pub image_max_bytes: usize,

    #[arg(long, env = "IMAGE_MAX_DIMENSION", default_value_t = 1920)]
    pub image_max_dimension: u32,

    #[arg(long, env = "IMAGE_FORMAT", value_enum, default_value_t = OutputFormat::Webp)]
    pub image_format: OutputFormat,

    /// Keep the original bytes when normalization fails instead of rejecting the upload
    #[arg(long, env = "IMAGE_FALLBACK", default_value_t = true, action = ArgAction::Set)]
    pub image_fallback: bool,

    /// Largest accepted image file, in bytes
    #[arg(long, env = "MAX_FILE_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_file_bytes: usize,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = 200 * 1024 * 1024)]
    pub max_body_bytes: usize,
}

impl Args {
    pub fn database_url(&self) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            format!("sqlite://{}", self.data_dir.join("truyen.db").to_string_lossy())
        })
    }

    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}/files", self.port))
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.data_dir.join("objects")
    }

    pub fn s3_config(&self) -> S3Config {
        S3Config {
            account_id: self.r2_account_id.clone(),
            access_key_id: self.r2_access_key_id.clone(),
            secret_access_key: self.r2_secret_access_key.clone(),
            bucket: self.r2_bucket_name.clone(),
            public_domain: self.r2_public_domain.clone(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn upload_settings(&self) -> UploadSettings {
        let normalize = self.normalize_images.then(|| NormalizeOptions {
            max_bytes: self.image_max_bytes,
            max_dimension: self.image_max_dimension,
            format: self.image_format,
            fallback: self.image_fallback,
        });

        UploadSettings {
            normalize,
            max_file_bytes: self.max_file_bytes,
        }
    }
}
