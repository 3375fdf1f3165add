//! Object store gateway for re-uploaded media
//! Uses Apache Arrow object_store crate (S3-compatible backend)

use object_store::aws::AmazonS3Builder;
use object_store::{
    Attribute, Attributes, ObjectStore, PutOptions, PutPayload, path::Path as StoragePath,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object store not connected")]
    NotConnected,

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Timed out after {0:?} waiting for object store")]
    Timeout(Duration),

    #[cfg(test)]
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Public URL for an uploaded object: the store's canonical location when it
/// reported one, otherwise `scheme://endpoint/bucket/key`.
pub fn resolve_public_url(
    location: Option<&str>,
    secure: bool,
    endpoint: &str,
    bucket: &str,
    key: &str,
) -> String {
    match location.filter(|l| !l.is_empty()) {
        Some(location) => location.to_string(),
        None => {
            let scheme = if secure { "https" } else { "http" };
            format!("{}://{}/{}/{}", scheme, endpoint, bucket, key)
        }
    }
}

/// Storage key: `key_prefix` followed by the file's original extension
pub fn object_key(path: &Path, key_prefix: &str) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", key_prefix, ext),
        _ => key_prefix.to_string(),
    }
}

#[derive(Clone)]
struct Backend {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    endpoint: String,
    secure: bool,
    public_base_url: Option<String>,
}

impl Backend {
    fn location(&self, key: &str) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), key))
    }

    fn public_url(&self, key: &str) -> String {
        resolve_public_url(
            self.location(key).as_deref(),
            self.secure,
            &self.endpoint,
            &self.bucket,
            key,
        )
    }
}

/// Gateway to the object store. Either connected, or unavailable for the
/// whole process lifetime.
#[derive(Clone, Default)]
pub struct StorageClient {
    backend: Option<Backend>,
}

impl StorageClient {
    /// Connect and verify the bucket. Never fails: any problem leaves the
    /// client in the unavailable state and is logged as a warning.
    pub async fn connect(config: &StorageConfig) -> Self {
        match Self::try_connect(config).await {
            Ok(backend) => {
                info!(endpoint = %backend.endpoint, bucket = %backend.bucket, "Object store connected");
                Self {
                    backend: Some(backend),
                }
            }
            Err(e) => {
                warn!(error = %e, "Object store not connected, re-upload disabled");
                Self::unavailable()
            }
        }
    }

    async fn try_connect(config: &StorageConfig) -> Result<Backend> {
        let endpoint = required(config.endpoint.as_deref(), "endpoint")?;
        let bucket = required(config.bucket.as_deref(), "bucket")?;
        let access_key = required(config.access_key.as_deref(), "access key")?;
        let secret_key = required(config.secret_key.as_deref(), "secret key")?;

        let scheme = if config.secure { "https" } else { "http" };
        let store = AmazonS3Builder::new()
            .with_endpoint(format!("{}://{}", scheme, endpoint))
            .with_bucket_name(bucket)
            .with_region(&config.region)
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key)
            .with_allow_http(!config.secure)
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;
        let store: Arc<dyn ObjectStore> = Arc::new(store);

        // Listing the bucket root fails when the bucket does not exist
        let timeout = Duration::from_secs(config.connect_timeout_secs);
        tokio::time::timeout(timeout, store.list_with_delimiter(None))
            .await
            .map_err(|_| StorageError::Timeout(timeout))??;

        Ok(Backend {
            store,
            bucket: bucket.to_string(),
            endpoint: endpoint.to_string(),
            secure: config.secure,
            public_base_url: config.public_base_url.clone(),
        })
    }

    /// Wrap an already-built store
    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        endpoint: impl Into<String>,
        secure: bool,
    ) -> Self {
        Self {
            backend: Some(Backend {
                store,
                bucket: bucket.into(),
                endpoint: endpoint.into(),
                secure,
                public_base_url: None,
            }),
        }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self::with_store(
            Arc::new(object_store::memory::InMemory::new()),
            "ufys-local",
            "localhost:9000",
            false,
        )
    }

    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_some()
    }

    /// Fail fast with [`StorageError::NotConnected`] before doing any work
    /// that only makes sense with a store behind it
    pub fn ensure_connected(&self) -> Result<()> {
        self.backend.as_ref().map(|_| ()).ok_or(StorageError::NotConnected)
    }

    /// Upload a local file under `key_prefix` + its extension and return the
    /// public URL of the object. Re-uploading the same key overwrites it.
    pub async fn upload_file(&self, path: &Path, key_prefix: &str) -> Result<String> {
        let backend = self.backend.as_ref().ok_or(StorageError::NotConnected)?;

        let key = object_key(path, key_prefix);
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        let data = tokio::fs::read(path).await?;
        let size = data.len();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.clone().into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        backend
            .store
            .put_opts(&StoragePath::from(key.as_str()), PutPayload::from(data), opts)
            .await?;

        info!(key, size, content_type, "Uploaded to storage");

        Ok(backend.public_url(&key))
    }

    /// Read an object back; only used to verify uploads
    #[cfg(test)]
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let backend = self.backend.as_ref().ok_or(StorageError::NotConnected)?;
        let path = StoragePath::from(key);

        let result = match backend.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let bytes = result.bytes().await?;

        Ok(bytes.to_vec())
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StorageError::Config(format!("{} not set", name)))
}
