use crate::api::{server, types::AppState};
use crate::config::{Args, StorageBackend};
use anyhow::{Context, Result};
use std::sync::Arc;
use truyen_storage::{LocalObjectStore, ObjectStore, S3ObjectStore, Storage, TaggedCache};

pub async fn build_state(args: &Args) -> Result<AppState> {
    tokio::fs::create_dir_all(&args.data_dir)
        .await
        .with_context(|| format!("creating data dir {}", args.data_dir.display()))?;

    let storage = Storage::new(&args.database_url()).await?;

    let objects: Arc<dyn ObjectStore> = match args.storage_backend {
        StorageBackend::Local => {
            let store = LocalObjectStore::new(args.objects_dir(), args.public_base_url()).await?;
            tracing::info!("Storing images under {}", args.objects_dir().display());
            Arc::new(store)
        }
        StorageBackend::S3 => {
            let store = S3ObjectStore::new(&args.s3_config())?;
            tracing::info!("Storing images in bucket {:?}", args.r2_bucket_name);
            Arc::new(store)
        }
    };

    let cache = TaggedCache::new(args.cache_capacity, args.cache_ttl());

    Ok(AppState::new(storage, objects, cache, args.upload_settings()))
}

pub async fn run(args: Args) -> Result<()> {
    let state = build_state(&args).await?;
    server::serve(args.port, state, args.max_body_bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[tokio::test]
    async fn local_backend_state_is_ready_to_serve() {
        let tmp = tempfile::TempDir::new().unwrap();
        let data_dir = tmp.path().join("data");
        let args = Args::try_parse_from([
            "truyen",
            "--data-dir",
            data_dir.to_str().unwrap(),
        ])
        .unwrap();

        let state = build_state(&args).await.unwrap();

        assert!(data_dir.join("truyen.db").exists());
        assert!(state.catalog.all_stories().await.unwrap().is_empty());
        assert_eq!(
            state.objects.public_url("stories/a/thumbnail.jpg"),
            "http://localhost:3000/files/stories/a/thumbnail.jpg"
        );
    }

    #[tokio::test]
    async fn s3_backend_requires_credentials() {
        let tmp = tempfile::TempDir::new().unwrap();
        let args = Args::try_parse_from([
            "truyen",
            "--data-dir",
            tmp.path().to_str().unwrap(),
            "--storage-backend",
            "s3",
        ])
        .unwrap();

        assert!(build_state(&args).await.is_err());
    }
}
