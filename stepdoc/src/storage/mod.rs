//! Artifact store: content-addressed binary storage for videos and audio.
//!
//! Backed by the `object_store` crate: an S3-compatible bucket (MinIO in
//! development, AWS in production) or a local filesystem directory. Keys are
//! flat strings with a filename prefix convention (`audio/...`,
//! `stitched/...`, `assets/...`).

use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as StorePath;
use object_store::signer::Signer;
use object_store::{Attribute, Attributes, ClientOptions, ObjectStore, PutOptions, PutPayload, RetryConfig};
use tokio::io::AsyncWriteExt;

use crate::config::StorageBackend;
use crate::{Error, Result};

/// Default presigned URL lifetime.
pub const DEFAULT_URL_TTL: Duration = Duration::from_secs(3600);

/// Artifact store contract consumed by the pipeline services.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload a blob under `key`; returns the key.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<String>;
    /// Upload a local file under `key`; returns the key.
    async fn put_file(&self, key: &str, path: &FsPath, content_type: &str) -> Result<String>;
    /// Stream a blob's bytes.
    async fn get_stream(&self, key: &str) -> Result<BoxStream<'static, object_store::Result<Bytes>>>;
    /// Download a blob to a local path.
    async fn download_to(&self, key: &str, dest: &FsPath) -> Result<()>;
    /// A URL a browser can fetch the blob from. Presigned for S3 backends;
    /// a stream-proxy path for backends that cannot sign.
    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String>;
}

fn client_options() -> ClientOptions {
    ClientOptions::new()
        .with_connect_timeout(Duration::from_secs(5))
        .with_timeout(Duration::from_secs(300))
}

fn retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        backoff: object_store::BackoffConfig {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            base: 2.0,
        },
        retry_timeout: Duration::from_secs(120),
    }
}

/// `object_store`-backed implementation.
pub struct ObjectStoreArtifactStore {
    store: Arc<dyn ObjectStore>,
    /// Present only for S3 backends; used to presign GET URLs.
    signer: Option<Arc<AmazonS3>>,
}

impl ObjectStoreArtifactStore {
    /// Build a store from the configured backend.
    pub fn from_config(backend: &StorageBackend) -> Result<Self> {
        match backend {
            StorageBackend::S3 {
                bucket,
                region,
                endpoint,
                allow_http,
            } => {
                tracing::info!(bucket, region, "Creating S3 artifact store");
                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_region(region)
                    .with_client_options(client_options())
                    .with_retry(retry_config());
                if let Some(endpoint) = endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_virtual_hosted_style_request(false);
                }
                if *allow_http {
                    builder = builder.with_allow_http(true);
                }
                let s3 = Arc::new(builder.build()?);
                Ok(Self {
                    store: s3.clone(),
                    signer: Some(s3),
                })
            }
            StorageBackend::Local { root } => {
                if !root.exists() {
                    std::fs::create_dir_all(root)?;
                }
                tracing::info!(root = %root.display(), "Creating local artifact store");
                Ok(Self {
                    store: Arc::new(LocalFileSystem::new_with_prefix(root)?),
                    signer: None,
                })
            }
        }
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            signer: None,
        }
    }

    fn put_options(content_type: &str) -> PutOptions {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        PutOptions {
            attributes,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ArtifactStore for ObjectStoreArtifactStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<String> {
        let path = StorePath::from(key);
        self.store
            .put_opts(&path, PutPayload::from_bytes(data), Self::put_options(content_type))
            .await?;
        Ok(key.to_string())
    }

    async fn put_file(&self, key: &str, path: &FsPath, content_type: &str) -> Result<String> {
        let data = tokio::fs::read(path).await?;
        self.put(key, Bytes::from(data), content_type).await
    }

    async fn get_stream(&self, key: &str) -> Result<BoxStream<'static, object_store::Result<Bytes>>> {
        let path = StorePath::from(key);
        let result = self.store.get(&path).await?;
        Ok(result.into_stream().boxed())
    }

    async fn download_to(&self, key: &str, dest: &FsPath) -> Result<()> {
        let mut stream = self.get_stream(key).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String> {
        match &self.signer {
            Some(s3) => {
                let path = StorePath::from(key);
                let url = s3
                    .signed_url(axum::http::Method::GET, &path, ttl)
                    .await
                    .map_err(Error::Storage)?;
                Ok(url.to_string())
            }
            // Local/in-memory stores cannot sign; route through the API proxy.
            None => Ok(format!("/api/v1/stream?path={key}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_download_round_trip() {
        let store = ObjectStoreArtifactStore::in_memory();
        store
            .put("audio/clip.mp3", Bytes::from_static(b"mp3-bytes"), "audio/mpeg")
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.mp3");
        store.download_to("audio/clip.mp3", &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"mp3-bytes");
    }

    #[tokio::test]
    async fn missing_key_is_an_error() {
        let store = ObjectStoreArtifactStore::in_memory();
        let dir = tempfile::tempdir().unwrap();
        let result = store
            .download_to("videos/nope.mp4", &dir.path().join("nope.mp4"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unsignable_backend_falls_back_to_proxy_url() {
        let store = ObjectStoreArtifactStore::in_memory();
        let url = store
            .presigned_url("videos/v.webm", DEFAULT_URL_TTL)
            .await
            .unwrap();
        assert_eq!(url, "/api/v1/stream?path=videos/v.webm");
    }
}
