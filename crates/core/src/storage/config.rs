//! Storage environment and driver selection.

use std::fmt;
use std::path::PathBuf;

use url::{Origin, Url};

/// Default public path prefix of the upload file server.
pub const DEFAULT_UPLOADS_PATH: &str = "uploads";

/// Storage backend selected for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageDriver {
    /// Local filesystem under `KAN_STORAGE_DIR`.
    Fs,
    /// S3-compatible object store.
    S3,
}

impl StorageDriver {
    /// Parses an explicit driver name, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fs" => Some(Self::Fs),
            "s3" => Some(Self::S3),
            _ => None,
        }
    }

    /// Driver name as used in configuration and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fs => "fs",
            Self::S3 => "s3",
        }
    }
}

impl fmt::Display for StorageDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// S3-compatible object store settings.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct S3Env {
    /// `S3_ENDPOINT`.
    pub endpoint: Option<String>,
    /// `S3_REGION`.
    pub region: Option<String>,
    /// `S3_ACCESS_KEY_ID`.
    pub access_key_id: Option<String>,
    /// `S3_SECRET_ACCESS_KEY`.
    pub secret_access_key: Option<String>,
    /// `S3_FORCE_PATH_STYLE`.
    pub force_path_style: bool,
}

impl S3Env {
    /// Region to sign requests for.
    #[must_use]
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or("auto")
    }
}

impl fmt::Debug for S3Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Env")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "[hidden]"),
            )
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

/// Snapshot of the storage-related environment.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageEnv {
    /// `KAN_STORAGE_DRIVER`, as given.
    pub driver: Option<String>,
    /// `KAN_STORAGE_DIR`.
    pub storage_dir: Option<PathBuf>,
    /// `KAN_STORAGE_URL`, falling back to `NEXT_PUBLIC_STORAGE_URL`.
    pub storage_url: Option<String>,
    /// `KAN_UPLOADS_PATH`.
    pub uploads_path: String,
    /// `KAN_STORAGE_SIGNING_SECRET`.
    pub signing_secret: Option<String>,
    /// Object store settings.
    pub s3: S3Env,
    /// `KAN_AVATAR_BUCKET_NAME`.
    pub avatar_bucket: Option<String>,
    /// `KAN_ATTACHMENTS_BUCKET_NAME`.
    pub attachments_bucket: Option<String>,
    /// `KAN_DOWNLOAD_ALLOWED_ORIGINS`, comma separated.
    pub allowed_download_origins: Vec<String>,
}

impl Default for StorageEnv {
    fn default() -> Self {
        Self {
            driver: None,
            storage_dir: None,
            storage_url: None,
            uploads_path: DEFAULT_UPLOADS_PATH.to_string(),
            signing_secret: None,
            s3: S3Env::default(),
            avatar_bucket: None,
            attachments_bucket: None,
            allowed_download_origins: Vec::new(),
        }
    }
}

impl fmt::Debug for StorageEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageEnv")
            .field("driver", &self.driver)
            .field("storage_dir", &self.storage_dir)
            .field("storage_url", &self.storage_url)
            .field("uploads_path", &self.uploads_path)
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "[hidden]"),
            )
            .field("s3", &self.s3)
            .field("avatar_bucket", &self.avatar_bucket)
            .field("attachments_bucket", &self.attachments_bucket)
            .field("allowed_download_origins", &self.allowed_download_origins)
            .finish()
    }
}

impl StorageEnv {
    /// Reads the storage settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the storage settings through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            driver: var("KAN_STORAGE_DRIVER"),
            storage_dir: var("KAN_STORAGE_DIR").map(PathBuf::from),
            storage_url: var("KAN_STORAGE_URL").or_else(|| var("NEXT_PUBLIC_STORAGE_URL")),
            uploads_path: var("KAN_UPLOADS_PATH")
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_UPLOADS_PATH.to_string()),
            signing_secret: var("KAN_STORAGE_SIGNING_SECRET"),
            s3: S3Env {
                endpoint: var("S3_ENDPOINT"),
                region: var("S3_REGION"),
                access_key_id: var("S3_ACCESS_KEY_ID"),
                secret_access_key: var("S3_SECRET_ACCESS_KEY"),
                force_path_style: var("S3_FORCE_PATH_STYLE")
                    .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1")),
            },
            avatar_bucket: var("KAN_AVATAR_BUCKET_NAME"),
            attachments_bucket: var("KAN_ATTACHMENTS_BUCKET_NAME"),
            allowed_download_origins: var("KAN_DOWNLOAD_ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Resolves the driver for this snapshot.
    #[must_use]
    pub fn driver(&self) -> StorageDriver {
        resolve_driver(self)
    }

    /// Whether the resolved driver has enough settings to be checked.
    ///
    /// The s3 driver needs an endpoint or access key and at least one bucket.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        match self.driver() {
            StorageDriver::Fs => self.storage_dir.is_some(),
            StorageDriver::S3 => {
                (self.s3.endpoint.is_some() || self.s3.access_key_id.is_some())
                    && (self.avatar_bucket.is_some() || self.attachments_bucket.is_some())
            }
        }
    }

    /// The uploads path with empty segments dropped, e.g. `static/uploads`.
    ///
    /// Falls back to the default path when `KAN_UPLOADS_PATH` holds only slashes.
    #[must_use]
    pub fn uploads_prefix(&self) -> String {
        let prefix = self
            .uploads_path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        if prefix.is_empty() {
            DEFAULT_UPLOADS_PATH.to_string()
        } else {
            prefix
        }
    }

    /// Whether callers may address `bucket`.
    #[must_use]
    pub fn is_known_bucket(&self, bucket: &str) -> bool {
        [&self.avatar_bucket, &self.attachments_bucket]
            .into_iter()
            .flatten()
            .any(|b| b == bucket)
    }

    /// Parsed public storage URL.
    #[must_use]
    pub fn storage_base_url(&self) -> Option<Url> {
        self.storage_url.as_deref().and_then(|u| Url::parse(u).ok())
    }

    /// Origins the attachment downloader may fetch from.
    #[must_use]
    pub fn allowed_origins(&self) -> Vec<Origin> {
        self.storage_url
            .iter()
            .chain(self.s3.endpoint.iter())
            .chain(self.allowed_download_origins.iter())
            .filter_map(|u| Url::parse(u).ok())
            .map(|u| u.origin())
            .filter(Origin::is_tuple)
            .collect()
    }

    /// Whether `url` may be proxied by the attachment downloader.
    ///
    /// Besides exact origins, virtual-hosted bucket hosts under the S3
    /// endpoint (`bucket.endpoint.host`) are accepted.
    #[must_use]
    pub fn is_allowed_download_url(&self, url: &Url) -> bool {
        let origin = url.origin();
        if !origin.is_tuple() {
            return false;
        }
        if self.allowed_origins().contains(&origin) {
            return true;
        }

        let Some(endpoint) = self.s3.endpoint.as_deref().and_then(|e| Url::parse(e).ok()) else {
            return false;
        };
        match (url.host_str(), endpoint.host_str()) {
            (Some(host), Some(endpoint_host)) => {
                url.scheme() == endpoint.scheme()
                    && url.port_or_known_default() == endpoint.port_or_known_default()
                    && host
                        .strip_suffix(endpoint_host)
                        .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.'))
            }
            _ => false,
        }
    }

    /// Maps a public file URL served by this deployment back to `(bucket, key)`.
    ///
    /// Returns `Ok(None)` when the URL is not under the local uploads prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if a path segment is not valid percent-encoded UTF-8.
    pub fn local_object_for(
        &self,
        url: &Url,
    ) -> Result<Option<(String, String)>, super::StorageError> {
        let Some(base) = self.storage_base_url() else {
            return Ok(None);
        };
        if base.origin() != url.origin() {
            return Ok(None);
        }

        let uploads = super::path::join_url(base.path(), &[&self.uploads_prefix()]);
        let prefix = format!("{uploads}/");
        let Some(rest) = url.path().strip_prefix(&prefix) else {
            return Ok(None);
        };

        let decoded = rest
            .split('/')
            .map(|segment| {
                urlencoding::decode(segment)
                    .map(std::borrow::Cow::into_owned)
                    .map_err(|_| super::StorageError::invalid_key("path is not valid UTF-8"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let Some((bucket, key)) = decoded.split_first() else {
            return Ok(None);
        };
        Ok(Some((bucket.clone(), key.join("/"))))
    }
}

/// Selects the storage driver.
///
/// An explicit `KAN_STORAGE_DRIVER` wins. Otherwise `S3_ENDPOINT` selects `s3`,
/// `KAN_STORAGE_DIR` selects `fs`, and the fallback is `s3`.
#[must_use]
pub fn resolve_driver(env: &StorageEnv) -> StorageDriver {
    if let Some(driver) = env.driver.as_deref().and_then(StorageDriver::parse) {
        return driver;
    }
    if env.s3.endpoint.is_some() {
        return StorageDriver::S3;
    }
    if env.storage_dir.is_some() {
        return StorageDriver::Fs;
    }
    StorageDriver::S3
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn env_with(driver: Option<&str>, endpoint: Option<&str>, dir: Option<&str>) -> StorageEnv {
        StorageEnv {
            driver: driver.map(String::from),
            storage_dir: dir.map(PathBuf::from),
            s3: S3Env {
                endpoint: endpoint.map(String::from),
                ..S3Env::default()
            },
            ..StorageEnv::default()
        }
    }

    #[rstest]
    #[case(Some("fs"), Some("http://minio:9000"), None, StorageDriver::Fs)]
    #[case(Some("S3"), None, Some("/data"), StorageDriver::S3)]
    #[case(Some(" Fs "), None, None, StorageDriver::Fs)]
    #[case(None, Some("http://minio:9000"), Some("/data"), StorageDriver::S3)]
    #[case(None, None, Some("/data"), StorageDriver::Fs)]
    #[case(None, None, None, StorageDriver::S3)]
    #[case(Some("gcs"), None, Some("/data"), StorageDriver::Fs)]
    #[case(Some("gcs"), None, None, StorageDriver::S3)]
    fn test_resolve_driver(
        #[case] driver: Option<&str>,
        #[case] endpoint: Option<&str>,
        #[case] dir: Option<&str>,
        #[case] expected: StorageDriver,
    ) {
        assert_eq!(resolve_driver(&env_with(driver, endpoint, dir)), expected);
    }

    #[test]
    fn test_from_env_resolves_driver() {
        temp_env::with_vars(
            [
                ("KAN_STORAGE_DRIVER", None),
                ("S3_ENDPOINT", Some("https://account.r2.cloudflarestorage.com")),
                ("KAN_STORAGE_DIR", Some("/var/lib/kan")),
            ],
            || assert_eq!(StorageEnv::from_env().driver(), StorageDriver::S3),
        );
        temp_env::with_vars(
            [
                ("KAN_STORAGE_DRIVER", None),
                ("S3_ENDPOINT", None),
                ("KAN_STORAGE_DIR", Some("/var/lib/kan")),
            ],
            || assert_eq!(StorageEnv::from_env().driver(), StorageDriver::Fs),
        );
        temp_env::with_vars(
            [
                ("KAN_STORAGE_DRIVER", Some("")),
                ("S3_ENDPOINT", Some("")),
                ("KAN_STORAGE_DIR", None),
            ],
            || assert_eq!(StorageEnv::from_env().driver(), StorageDriver::S3),
        );
    }

    #[test]
    fn test_from_lookup_parses_values() {
        let env = StorageEnv::from_lookup(|name| {
            let value = match name {
                "NEXT_PUBLIC_STORAGE_URL" => Some("http://localhost:3000"),
                "KAN_UPLOADS_PATH" => Some("/files/"),
                "S3_FORCE_PATH_STYLE" => Some("TRUE"),
                "KAN_DOWNLOAD_ALLOWED_ORIGINS" => Some("https://a.example, ,https://b.example"),
                "KAN_ATTACHMENTS_BUCKET_NAME" => Some("attachments"),
                _ => None,
            };
            value.map(String::from)
        });

        assert_eq!(env.storage_url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(env.uploads_path, "files");
        assert!(env.s3.force_path_style);
        assert_eq!(env.s3.region(), "auto");
        assert_eq!(
            env.allowed_download_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert!(env.is_known_bucket("attachments"));
        assert!(!env.is_known_bucket("avatars"));
    }

    #[test]
    fn test_is_configured() {
        assert!(!StorageEnv::default().is_configured());
        assert!(env_with(None, None, Some("/data")).is_configured());
        assert!(!env_with(Some("fs"), Some("http://minio:9000"), None).is_configured());
        assert!(!env_with(None, Some("http://minio:9000"), None).is_configured());
        let with_bucket = StorageEnv {
            attachments_bucket: Some("attachments".into()),
            ..env_with(None, Some("http://minio:9000"), None)
        };
        assert!(with_bucket.is_configured());
    }

    #[rstest]
    #[case("uploads", "uploads")]
    #[case("/static//uploads/", "static/uploads")]
    #[case("//", "uploads")]
    fn test_uploads_prefix(#[case] raw: &str, #[case] expected: &str) {
        let env = StorageEnv {
            uploads_path: raw.into(),
            ..StorageEnv::default()
        };
        assert_eq!(env.uploads_prefix(), expected);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let env = StorageEnv {
            signing_secret: Some("topsecret".into()),
            s3: S3Env {
                secret_access_key: Some("alsosecret".into()),
                ..S3Env::default()
            },
            ..StorageEnv::default()
        };
        let rendered = format!("{env:?}");
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.contains("alsosecret"));
    }

    #[test]
    fn test_allowed_download_urls() {
        let env = StorageEnv {
            storage_url: Some("https://kan.example/".into()),
            s3: S3Env {
                endpoint: Some("https://s3.example.com".into()),
                ..S3Env::default()
            },
            allowed_download_origins: vec!["https://cdn.example".into()],
            ..StorageEnv::default()
        };

        let allowed = |u: &str| env.is_allowed_download_url(&Url::parse(u).expect("valid url"));

        assert!(allowed("https://kan.example/uploads/a/b.png"));
        assert!(allowed("https://s3.example.com/attachments/b.png"));
        assert!(allowed("https://attachments.s3.example.com/b.png"));
        assert!(allowed("https://cdn.example/x"));
        assert!(!allowed("http://kan.example/uploads/a/b.png"));
        assert!(!allowed("https://evil.example/x"));
        assert!(!allowed("https://evils3.example.com/x"));
        assert!(!allowed("https://kan.example:8443/x"));
    }

    #[test]
    fn test_local_object_for() {
        let env = StorageEnv {
            storage_url: Some("https://kan.example/app".into()),
            ..StorageEnv::default()
        };
        let parse = |u: &str| env.local_object_for(&Url::parse(u).expect("valid url"));

        assert_eq!(
            parse("https://kan.example/app/uploads/attachments/user%201/file.pdf")
                .expect("decodes"),
            Some(("attachments".to_string(), "user 1/file.pdf".to_string()))
        );
        assert_eq!(parse("https://kan.example/uploads/a/b").expect("ok"), None);
        assert_eq!(parse("https://other.example/app/uploads/a/b").expect("ok"), None);
        assert!(parse("https://kan.example/app/uploads/a/%FF").is_err());

        let nested = StorageEnv {
            storage_url: Some("https://kan.example/".into()),
            uploads_path: "/static//uploads/".into(),
            ..StorageEnv::default()
        };
        let url = Url::parse("https://kan.example/static/uploads/attachments/a.pdf")
            .expect("valid url");
        assert_eq!(
            nested.local_object_for(&url).expect("decodes"),
            Some(("attachments".to_string(), "a.pdf".to_string()))
        );
    }
}
