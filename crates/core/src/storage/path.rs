//! Key validation, upload path resolution and public URL joining.

use std::path::{Component, Path, PathBuf};

use super::error::StorageError;

/// Validates a storage key: one or more `/`-separated segments.
///
/// Rejects empty keys, empty segments (leading, trailing or doubled `/`),
/// `.` and `..` segments, backslashes and NUL bytes.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::invalid_key("key is empty"));
    }
    key.split('/').try_for_each(validate_segment)
}

/// Validates a bucket name: exactly one key segment.
pub fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    if bucket.contains('/') {
        return Err(StorageError::invalid_key("bucket must be a single segment"));
    }
    validate_segment(bucket)
}

fn validate_segment(segment: &str) -> Result<(), StorageError> {
    match segment {
        "" => Err(StorageError::invalid_key("empty path segment")),
        "." | ".." => Err(StorageError::invalid_key("relative path segment")),
        s if s.contains(['\\', '\0']) => Err(StorageError::invalid_key("forbidden character")),
        _ => Ok(()),
    }
}

/// Resolves `bucket/key` under `root` without touching the filesystem.
///
/// The result is guaranteed to be a lexical descendant of `root`.
pub fn resolve_upload_path(root: &Path, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
    validate_bucket(bucket)?;
    validate_key(key)?;

    let relative: PathBuf = std::iter::once(bucket).chain(key.split('/')).collect();
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(StorageError::invalid_key("path escapes the uploads root"));
    }

    let path = root.join(relative);
    if !path.starts_with(root) {
        return Err(StorageError::invalid_key("path escapes the uploads root"));
    }
    Ok(path)
}

/// Confirms that `path` stays inside `root` once symlinks are resolved.
///
/// For paths that do not exist yet, the nearest existing ancestor is checked.
pub async fn confine_to_root(root: &Path, path: &Path) -> Result<(), StorageError> {
    let root = tokio::fs::canonicalize(root).await?;

    let mut candidate = path;
    let resolved = loop {
        match tokio::fs::canonicalize(candidate).await {
            Ok(resolved) => break resolved,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                candidate = candidate
                    .parent()
                    .ok_or_else(|| StorageError::invalid_key("path escapes the uploads root"))?;
            }
            Err(e) => return Err(e.into()),
        }
    };

    if resolved.starts_with(&root) {
        Ok(())
    } else {
        Err(StorageError::invalid_key("path escapes the uploads root"))
    }
}

/// Joins URL parts with exactly one `/` at every boundary.
///
/// The path of `base` and every part are split on `/` and empty segments
/// dropped, so doubled slashes collapse wherever they appear. The
/// `scheme://authority` prefix of `base` is kept as is.
#[must_use]
pub fn join_url(base: &str, parts: &[&str]) -> String {
    let (head, path) = match base.find("://") {
        Some(i) => {
            let authority_start = i + 3;
            match base[authority_start..].find('/') {
                Some(j) => base.split_at(authority_start + j),
                None => (base, ""),
            }
        }
        None => ("", base),
    };

    let mut url = head.to_string();
    for segment in std::iter::once(path)
        .chain(parts.iter().copied())
        .flat_map(|p| p.split('/'))
        .filter(|s| !s.is_empty())
    {
        url.push('/');
        url.push_str(segment);
    }
    url
}
