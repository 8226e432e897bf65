use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Durable blob storage with time-limited read links.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write `data` under `key`, replacing any previous object.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    /// Issue a fresh signed GET link for `key`, valid for `expires_in`.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Client for S3-compatible object storage (Cloudflare R2, AWS S3, MinIO).
pub struct S3ArtifactStore {
    bucket: Box<Bucket>,
}

impl S3ArtifactStore {
    pub fn new(
        bucket_name: &str,
        region: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { bucket })
    }

    /// Download an artifact.
    pub async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await.map_err(StorageError::S3)?;
        Ok(response.to_vec())
    }

    /// Delete an artifact.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.bucket.delete_object(key).await.map_err(StorageError::S3)?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        self.bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        let expiry_secs = u32::try_from(expires_in.as_secs())
            .map_err(|_| StorageError::Config("link lifetime too long".to_string()))?;
        // Signed into the link so two issuances never collide within one second.
        let mut queries = HashMap::new();
        queries.insert("x-link-id".to_string(), Uuid::new_v4().simple().to_string());

        let url = self
            .bucket
            .presign_get(key, expiry_secs, Some(queries))
            .await
            .map_err(StorageError::S3)?;
        Ok(url)
    }
}

/// In-process artifact store. Links use the `memory://` scheme.
#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
    pub writes: u32,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let mut objects = self.objects.lock().await;
        let writes = objects.get(key).map_or(0, |o| o.writes) + 1;
        objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                content_type: content_type.to_string(),
                writes,
            },
        );
        Ok(())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        if !self.objects.lock().await.contains_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let lifetime = ChronoDuration::from_std(expires_in)
            .map_err(|_| StorageError::Config("link lifetime too long".to_string()))?;
        let expires = (Utc::now() + lifetime).timestamp();
        Ok(format!(
            "memory://artifacts/{key}?expires={expires}&signature={}",
            Uuid::new_v4().simple()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overwrite_counts_writes() {
        let store = MemoryArtifactStore::new();
        store.put("u/2024-01-01/j", b"body", "text/plain").await.unwrap();
        store.put("u/2024-01-01/j", b"body", "text/plain").await.unwrap();

        let object = store.object("u/2024-01-01/j").await.unwrap();
        assert_eq!(object.writes, 2);
        assert_eq!(object.data, b"body");
        assert_eq!(store.keys().await, vec!["u/2024-01-01/j".to_string()]);
    }

    #[tokio::test]
    async fn test_links_are_fresh_per_issue() {
        let store = MemoryArtifactStore::new();
        store.put("k", b"x", "text/plain").await.unwrap();

        let a = store.presign_get("k", Duration::from_secs(3600)).await.unwrap();
        let b = store.presign_get("k", Duration::from_secs(3600)).await.unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("memory://artifacts/k?expires="));
    }

    #[tokio::test]
    async fn test_link_for_missing_object_fails() {
        let store = MemoryArtifactStore::new();
        assert!(matches!(
            store.presign_get("nope", Duration::from_secs(60)).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
