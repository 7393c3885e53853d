//! Storage facade implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use opendal::{Operator, services};
use serde::Serialize;

use super::config::{StorageDriver, StorageEnv};
use super::content_type::content_type_for;
use super::error::StorageError;
use super::path::{confine_to_root, join_url, resolve_upload_path, validate_bucket, validate_key};
use super::signing::{sign_upload, verify_upload};

/// Directory under the fs root that holds uploads still in flight.
const PARTIAL_DIR: &str = ".partial";

/// URL a client uses to upload or download an object.
#[derive(Debug, Clone, Serialize)]
pub struct PresignedUrl {
    /// The URL.
    pub url: String,
    /// HTTP method to use (PUT for upload, GET for download).
    pub method: String,
    /// When the URL expires; `None` for public URLs.
    pub expires_at: Option<DateTime<Utc>>,
    /// Required headers for the request.
    pub headers: HashMap<String, String>,
}

/// A local file opened for streaming.
#[derive(Debug)]
pub struct StoredFile {
    /// Open handle positioned at the start.
    pub file: tokio::fs::File,
    /// File length in bytes.
    pub len: u64,
    /// Content type guessed from the key.
    pub content_type: &'static str,
}

/// Upload/download/delete facade over the fs and s3 drivers.
#[derive(Debug, Clone)]
pub struct Storage {
    env: StorageEnv,
    upload_ttl: Duration,
    download_ttl: Duration,
}

impl Storage {
    /// Default upload TTL: 15 minutes.
    pub const DEFAULT_UPLOAD_TTL: u64 = 900;
    /// Default download TTL: 1 hour.
    pub const DEFAULT_DOWNLOAD_TTL: u64 = 3600;

    /// Create a facade over an environment snapshot.
    #[must_use]
    pub fn new(env: StorageEnv) -> Self {
        Self {
            env,
            upload_ttl: Duration::from_secs(Self::DEFAULT_UPLOAD_TTL),
            download_ttl: Duration::from_secs(Self::DEFAULT_DOWNLOAD_TTL),
        }
    }

    /// Set upload URL TTL.
    #[must_use]
    pub fn with_upload_ttl(mut self, secs: u64) -> Self {
        self.upload_ttl = Duration::from_secs(secs);
        self
    }

    /// Set download URL TTL.
    #[must_use]
    pub fn with_download_ttl(mut self, secs: u64) -> Self {
        self.download_ttl = Duration::from_secs(secs);
        self
    }

    /// The environment snapshot.
    #[must_use]
    pub fn env(&self) -> &StorageEnv {
        &self.env
    }

    /// Driver for the next call.
    #[must_use]
    pub fn driver(&self) -> StorageDriver {
        self.env.driver()
    }

    /// Time-limited URL for uploading `bucket/key` with `content_type`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid, the driver is not configured,
    /// or presigning fails.
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<PresignedUrl, StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let expires_at = Utc::now() + to_chrono(self.upload_ttl);

        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());

        match self.driver() {
            StorageDriver::S3 => {
                let presigned = self
                    .operator(bucket)?
                    .presign_write(key, self.upload_ttl)
                    .await?;
                for (name, value) in presigned.header() {
                    if let Ok(value) = value.to_str() {
                        headers.insert(name.to_string(), value.to_string());
                    }
                }

                Ok(PresignedUrl {
                    url: presigned.uri().to_string(),
                    method: presigned.method().to_string(),
                    expires_at: Some(expires_at),
                    headers,
                })
            }
            StorageDriver::Fs => {
                let secret = self.signing_secret()?;
                let expires = expires_at.timestamp();
                let signature = sign_upload(secret, bucket, key, expires, content_type);

                Ok(PresignedUrl {
                    url: format!(
                        "{}?expires={expires}&signature={signature}",
                        self.public_url(bucket, key)?
                    ),
                    method: "PUT".to_string(),
                    expires_at: Some(expires_at),
                    headers,
                })
            }
        }
    }

    /// URL for downloading `bucket/key`.
    ///
    /// The fs driver returns the public URL of the upload file server; the s3
    /// driver returns a presigned GET.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid, the driver is not configured,
    /// or presigning fails.
    pub async fn download(&self, bucket: &str, key: &str) -> Result<PresignedUrl, StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;

        match self.driver() {
            StorageDriver::S3 => {
                let presigned = self
                    .operator(bucket)?
                    .presign_read(key, self.download_ttl)
                    .await?;

                Ok(PresignedUrl {
                    url: presigned.uri().to_string(),
                    method: presigned.method().to_string(),
                    expires_at: Some(Utc::now() + to_chrono(self.download_ttl)),
                    headers: HashMap::new(),
                })
            }
            StorageDriver::Fs => Ok(PresignedUrl {
                url: self.public_url(bucket, key)?,
                method: "GET".to_string(),
                expires_at: None,
                headers: HashMap::new(),
            }),
        }
    }

    /// Delete `bucket/key`. Deleting a missing object succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backend fails.
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;

        match self.driver() {
            StorageDriver::S3 => match self.operator(bucket)?.delete(key).await {
                Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
                other => other.map_err(StorageError::from),
            },
            StorageDriver::Fs => {
                let root = self.local_root()?;
                let path = local_path(root, bucket, key)?;
                match confine_to_root(root, &path).await {
                    Err(StorageError::NotFound { .. }) => return Ok(()),
                    other => other?,
                }
                local_operator(root)?
                    .delete(&object_path(bucket, key))
                    .await
                    .map_err(StorageError::from)
            }
        }
    }

    /// Open a locally stored file for streaming.
    ///
    /// The key is validated before any filesystem access. Without the fs
    /// driver nothing is stored locally and every key is reported missing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for unsafe keys and `NotFound` for missing files.
    pub async fn open(&self, bucket: &str, key: &str) -> Result<StoredFile, StorageError> {
        let root = match (self.driver(), self.env.storage_dir.as_deref()) {
            (StorageDriver::Fs, Some(root)) => root,
            _ => {
                validate_bucket(bucket)?;
                validate_key(key)?;
                return Err(StorageError::not_found(format!("{bucket}/{key}")));
            }
        };

        let path = local_path(root, bucket, key)?;
        confine_to_root(root, &path).await?;

        let meta = local_operator(root)?.stat(&object_path(bucket, key)).await?;
        if !meta.mode().is_file() {
            return Err(StorageError::not_found(format!("{bucket}/{key}")));
        }

        Ok(StoredFile {
            file: tokio::fs::File::open(&path).await?,
            len: meta.content_length(),
            content_type: content_type_for(key),
        })
    }

    /// Check a signed local upload request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSignature` when the signature does not match or has expired.
    pub fn verify_local_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        expires: i64,
        signature: &str,
    ) -> Result<(), StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let secret = self.signing_secret()?;

        if verify_upload(
            secret,
            bucket,
            key,
            expires,
            content_type,
            signature,
            Utc::now().timestamp(),
        ) {
            Ok(())
        } else {
            Err(StorageError::InvalidSignature)
        }
    }

    /// Write a request body to local storage, replacing any existing file.
    ///
    /// The body is staged under the root's partial directory and moved into
    /// place once complete, so readers never see a truncated file.
    ///
    /// # Errors
    ///
    /// Returns `FileTooLarge` once more than `max_bytes` arrive.
    pub async fn write_local<S, E>(
        &self,
        bucket: &str,
        key: &str,
        mut body: S,
        max_bytes: u64,
    ) -> Result<u64, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let root = self.local_root()?;
        let path = local_path(root, bucket, key)?;
        tokio::fs::create_dir_all(root).await?;
        confine_to_root(root, &path).await?;

        let mut writer = local_operator(root)?
            .writer(&object_path(bucket, key))
            .await?;
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(StorageError::operation(e.to_string()));
                }
            };
            written = written.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
            if written > max_bytes {
                let _ = writer.abort().await;
                return Err(StorageError::FileTooLarge { max: max_bytes });
            }
            if let Err(e) = writer.write(chunk).await {
                let _ = writer.abort().await;
                return Err(e.into());
            }
        }
        writer.close().await?;

        Ok(written)
    }

    /// Reachability of the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the fs root is not a directory or the object store
    /// cannot be listed.
    pub async fn check(&self) -> Result<(), StorageError> {
        match self.driver() {
            StorageDriver::Fs => {
                let meta = tokio::fs::metadata(self.local_root()?).await?;
                if meta.is_dir() {
                    Ok(())
                } else {
                    Err(StorageError::configuration("KAN_STORAGE_DIR is not a directory"))
                }
            }
            StorageDriver::S3 => {
                let bucket = self
                    .env
                    .attachments_bucket
                    .as_deref()
                    .or(self.env.avatar_bucket.as_deref())
                    .ok_or_else(|| StorageError::configuration("no bucket configured"))?;
                self.operator(bucket)?.check().await.map_err(StorageError::from)
            }
        }
    }

    /// Public URL of a locally stored object.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage URL is not configured or the key is invalid.
    pub fn public_url(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let base = self
            .env
            .storage_url
            .as_deref()
            .ok_or_else(|| StorageError::configuration("KAN_STORAGE_URL is not set"))?;

        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let encoded_bucket = urlencoding::encode(bucket);
        let prefix = self.env.uploads_prefix();

        Ok(join_url(
            base,
            &[
                prefix.as_str(),
                encoded_bucket.as_ref(),
                encoded_key.as_str(),
            ],
        ))
    }

    fn local_root(&self) -> Result<&Path, StorageError> {
        self.env
            .storage_dir
            .as_deref()
            .ok_or_else(|| StorageError::configuration("KAN_STORAGE_DIR is not set"))
    }

    fn signing_secret(&self) -> Result<&str, StorageError> {
        self.env
            .signing_secret
            .as_deref()
            .ok_or_else(|| StorageError::configuration("KAN_STORAGE_SIGNING_SECRET is not set"))
    }

    /// Create an OpenDAL operator for one bucket.
    fn operator(&self, bucket: &str) -> Result<Operator, StorageError> {
        let s3 = &self.env.s3;
        let mut builder = services::S3::default().bucket(bucket).region(s3.region());

        if let Some(endpoint) = s3.endpoint.as_deref() {
            builder = builder.endpoint(endpoint);
        }
        if let Some(access_key_id) = s3.access_key_id.as_deref() {
            builder = builder.access_key_id(access_key_id);
        }
        if let Some(secret_access_key) = s3.secret_access_key.as_deref() {
            builder = builder.secret_access_key(secret_access_key);
        }
        if !s3.force_path_style {
            builder = builder.enable_virtual_host_style();
        }

        Ok(Operator::new(builder)
            .map_err(|e| StorageError::configuration(e.to_string()))?
            .finish())
    }
}

/// OpenDAL operator over the local uploads root.
fn local_operator(root: &Path) -> Result<Operator, StorageError> {
    let partial = root.join(PARTIAL_DIR);
    let builder = services::Fs::default()
        .root(
            root.to_str()
                .ok_or_else(|| StorageError::configuration("KAN_STORAGE_DIR is not valid UTF-8"))?,
        )
        .atomic_write_dir(
            partial
                .to_str()
                .ok_or_else(|| StorageError::configuration("KAN_STORAGE_DIR is not valid UTF-8"))?,
        );

    Ok(Operator::new(builder)
        .map_err(|e| StorageError::configuration(e.to_string()))?
        .finish())
}

/// Resolves `bucket/key` under `root`, keeping the partial directory private.
fn local_path(root: &Path, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
    if bucket == PARTIAL_DIR {
        return Err(StorageError::invalid_key("reserved bucket name"));
    }
    resolve_upload_path(root, bucket, key)
}

fn object_path(bucket: &str, key: &str) -> String {
    format!("{bucket}/{key}")
}

fn to_chrono(ttl: Duration) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
