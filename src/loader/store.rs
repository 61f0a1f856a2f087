//! Source store abstraction over local filesystem and S3 backends.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use super::error::StoreError;
use super::source::Collection;
use crate::config::StorageSettings;

/// Where agent source, memory documents and cached query results live.
///
/// `list`/`read`/`write` operate on collections; `read_path`/`write_path`
/// reach arbitrary documents (memory, patterns, query cache) the same way
/// the original file share did.
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn list(&self, collection: Collection) -> Result<Vec<String>, StoreError>;

    async fn read(&self, collection: Collection, file_id: &str) -> Result<Option<Bytes>, StoreError>;

    async fn write(
        &self,
        collection: Collection,
        file_id: &str,
        content: Bytes,
    ) -> Result<(), StoreError>;

    async fn read_path(&self, path: &str) -> Result<Option<Bytes>, StoreError>;

    async fn write_path(&self, path: &str, content: Bytes) -> Result<(), StoreError>;
}

/// [`SourceStore`] backed by `object_store` (local directory or S3 bucket).
pub struct ObjectSourceStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectSourceStore {
    /// Build from configuration: S3 when configured, else a local directory.
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, StoreError> {
        if let Some(s3) = &settings.s3 {
            let mut builder = AmazonS3Builder::from_env();
            if let Some(bucket) = &s3.bucket {
                builder = builder.with_bucket_name(bucket.as_str());
            }
            if let Some(region) = &s3.region {
                builder = builder.with_region(region.as_str());
            }
            if let Some(endpoint) = &s3.endpoint {
                // Custom endpoints (MinIO, LocalStack) are usually plain HTTP.
                builder = builder.with_endpoint(endpoint.as_str()).with_allow_http(true);
            }
            if let Some(key) = &s3.access_key_id {
                builder = builder.with_access_key_id(key.as_str());
            }
            if let Some(secret) = &s3.secret_access_key {
                builder = builder.with_secret_access_key(secret.as_str());
            }
            let store = builder.build().map_err(StoreError::ObjectStore)?;
            return Ok(Self {
                store: Arc::new(store),
            });
        }

        match &settings.local_path {
            Some(path) => Self::local(Path::new(path)),
            None => Err(StoreError::NotConfigured),
        }
    }

    /// Local-directory store rooted at `root`. Collection directories are
    /// created eagerly so a fresh root lists as empty instead of erroring.
    pub fn local(root: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root)?;
        for collection in Collection::SCAN_ORDER {
            std::fs::create_dir_all(root.join(collection.prefix()))?;
        }
        let store = LocalFileSystem::new_with_prefix(root).map_err(StoreError::ObjectStore)?;
        Ok(Self {
            store: Arc::new(store),
        })
    }

    fn object_path(path: &str) -> Result<ObjectPath, StoreError> {
        ObjectPath::parse(path).map_err(|e| StoreError::InvalidPath(e.to_string()))
    }

    fn collection_path(collection: Collection, file_id: &str) -> Result<ObjectPath, StoreError> {
        Self::object_path(&format!("{}/{}", collection.prefix(), file_id))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::ObjectStore(object_store::Error::Generic {
            store: "local",
            source: Box::new(err),
        })
    }
}

#[async_trait]
impl SourceStore for ObjectSourceStore {
    async fn list(&self, collection: Collection) -> Result<Vec<String>, StoreError> {
        let prefix = Self::object_path(collection.prefix())?;
        let mut stream = self.store.list(Some(&prefix));
        let mut names = Vec::new();
        while let Some(entry) = stream.next().await {
            match entry {
                Ok(meta) => {
                    if let Some(name) = meta.location.filename() {
                        names.push(name.to_string());
                    }
                }
                // A missing prefix is an empty collection, not a failure.
                Err(object_store::Error::NotFound { .. }) => break,
                Err(e) => return Err(e.into()),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read(&self, collection: Collection, file_id: &str) -> Result<Option<Bytes>, StoreError> {
        let path = Self::collection_path(collection, file_id)?;
        self.read_object(&path).await
    }

    async fn write(
        &self,
        collection: Collection,
        file_id: &str,
        content: Bytes,
    ) -> Result<(), StoreError> {
        let path = Self::collection_path(collection, file_id)?;
        self.store.put(&path, PutPayload::from(content)).await?;
        Ok(())
    }

    async fn read_path(&self, path: &str) -> Result<Option<Bytes>, StoreError> {
        let path = Self::object_path(path)?;
        self.read_object(&path).await
    }

    async fn write_path(&self, path: &str, content: Bytes) -> Result<(), StoreError> {
        let path = Self::object_path(path)?;
        self.store.put(&path, PutPayload::from(content)).await?;
        Ok(())
    }
}

impl ObjectSourceStore {
    async fn read_object(&self, path: &ObjectPath) -> Result<Option<Bytes>, StoreError> {
        match self.store.get(path).await {
            Ok(result) => match result.bytes().await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) => {
                    warn!(path = %path, "failed to read object body: {e}");
                    Err(e.into())
                }
            },
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
