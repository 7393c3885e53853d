//! Storage facade for uploaded files using Apache OpenDAL.
//!
//! Two drivers sit behind one interface:
//! - `s3`: any S3-compatible object store (AWS S3, Cloudflare R2, MinIO)
//! - `fs`: a local directory served back by the upload file server
//!
//! The driver is resolved from the environment snapshot on every call.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Storage facade                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ upload(bucket, key, type)  │ s3: presign_write  fs: signed PUT   │
//! │ download(bucket, key)      │ s3: presign_read   fs: public URL   │
//! │ delete(bucket, key)        │ s3: op.delete      fs: Fs op.delete │
//! │ write_local / open         │ fs: Fs op.writer / op.stat          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod content_type;
mod error;
mod path;
mod service;
mod signing;

pub use config::{S3Env, StorageDriver, StorageEnv, resolve_driver};
pub use content_type::content_type_for;
pub use error::StorageError;
pub use path::{confine_to_root, join_url, resolve_upload_path, validate_bucket, validate_key};
pub use service::{PresignedUrl, Storage, StoredFile};
pub use signing::{sign_upload, verify_upload};
