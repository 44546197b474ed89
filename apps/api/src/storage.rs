use anyhow::Context;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{config::Credentials, primitives::ByteStream, Client};
use bytes::Bytes;

use crate::config::Config;

/// Where an uploaded object ended up.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Carried in `AppState` as `Arc<dyn BlobStore>`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<StoredBlob>;
    /// `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> anyhow::Result<Option<Blob>>;
}

#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3BlobStore {
    /// Constructs an S3 client configured for MinIO (local) or AWS (production).
    pub async fn from_config(config: &Config) -> Self {
        let credentials = Credentials::new(
            &config.aws_access_key_id,
            &config.aws_secret_access_key,
            None,
            None,
            "shortlist-static",
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .endpoint_url(&config.s3_endpoint)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.s3_bucket.clone(),
            public_url: config.s3_public_url.clone(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<StoredBlob> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("s3 put_object {key}"))?;

        Ok(StoredBlob {
            key: key.to_string(),
            url: public_url(&self.public_url, key),
        })
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Blob>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Ok(None)
            }
            Err(err) => return Err(err).with_context(|| format!("s3 get_object {key}")),
        };

        let content_type = output.content_type().map(str::to_string);
        let bytes = output
            .body
            .collect()
            .await
            .with_context(|| format!("s3 read body {key}"))?
            .into_bytes();

        Ok(Some(Blob {
            bytes,
            content_type,
        }))
    }
}

fn public_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

#[cfg(test)]
pub use memory::MemoryBlobStore;

#[cfg(test)]
mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryBlobStore {
        objects: Mutex<HashMap<String, Blob>>,
    }

    impl MemoryBlobStore {
        pub fn keys(&self) -> Vec<String> {
            self.objects.lock().unwrap().keys().cloned().collect()
        }

        pub fn insert(&self, key: &str, bytes: impl Into<Bytes>, content_type: &str) {
            self.objects.lock().unwrap().insert(
                key.to_string(),
                Blob {
                    bytes: bytes.into(),
                    content_type: Some(content_type.to_string()),
                },
            );
        }
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn put(
            &self,
            key: &str,
            body: Bytes,
            content_type: &str,
        ) -> anyhow::Result<StoredBlob> {
            self.insert(key, body, content_type);
            Ok(StoredBlob {
                key: key.to_string(),
                url: public_url("https://blob.test", key),
            })
        }

        async fn get(&self, key: &str) -> anyhow::Result<Option<Blob>> {
            Ok(self.objects.lock().unwrap().get(key).cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url_joins_without_double_slash() {
        assert_eq!(
            public_url("http://minio:9000/resumes/", "resumes/cs_1/a.pdf"),
            "http://minio:9000/resumes/resumes/cs_1/a.pdf"
        );
        assert_eq!(public_url("https://cdn.x", "k"), "https://cdn.x/k");
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryBlobStore::default();
        let stored = store
            .put("resumes/a/b.pdf", Bytes::from_static(b"%PDF-1.4"), "application/pdf")
            .await
            .unwrap();
        assert_eq!(stored.key, "resumes/a/b.pdf");
        assert!(stored.url.ends_with("/resumes/a/b.pdf"));

        let blob = store.get("resumes/a/b.pdf").await.unwrap().unwrap();
        assert_eq!(&blob.bytes[..], b"%PDF-1.4");
        assert_eq!(blob.content_type.as_deref(), Some("application/pdf"));
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
