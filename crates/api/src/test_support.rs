//! Helpers for router tests.

use std::path::Path;

use axum::{body::Body, http::Request, response::Response};
use bytes::Bytes;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use kan_core::storage::{Storage, StorageEnv};
use kan_db::SessionRepository;
use kan_db::entities::{sessions, users};
use kan_shared::RateLimitConfig;
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
use tower::ServiceExt;
use uuid::Uuid;

use crate::{AppState, create_router};

pub const SIGNING_SECRET: &str = "test-signing-secret";

/// Filesystem storage rooted at `root`, served from `http://localhost:3000`.
pub fn fs_env(root: &Path) -> StorageEnv {
    StorageEnv {
        driver: Some("fs".into()),
        storage_dir: Some(root.to_path_buf()),
        storage_url: Some("http://localhost:3000".into()),
        signing_secret: Some(SIGNING_SECRET.into()),
        avatar_bucket: Some("avatars".into()),
        attachments_bucket: Some("attachments".into()),
        ..StorageEnv::default()
    }
}

/// State over a disconnected database.
pub fn state(env: StorageEnv) -> AppState {
    AppState::new(
        DatabaseConnection::default(),
        Storage::new(env),
        RateLimitConfig::default(),
    )
    .expect("http client")
}

/// Bearer token of the session served by [`signed_in_state`].
pub const SESSION_TOKEN: &str = "signed-in-token";

/// The user owning [`SESSION_TOKEN`].
pub fn session_user() -> users::Model {
    users::Model {
        id: Uuid::from_u128(0x0192_5e2c_7a40_7000_8000_0000_0000_0001),
        name: Some("Ada Kan".into()),
        email: "ada@kan.example".into(),
        image: Some("avatars/ada.png".into()),
        created_at: Utc::now().into(),
        deleted_at: None,
    }
}

/// State whose database answers `lookups` session queries with an active
/// session for [`session_user`].
pub fn signed_in_state(env: StorageEnv, lookups: usize) -> AppState {
    let user = session_user();
    let now = Utc::now();
    let session = sessions::Model {
        id: Uuid::new_v4(),
        user_id: user.id,
        token_hash: SessionRepository::hash_token(SESSION_TOKEN),
        ip_address: None,
        user_agent: None,
        expires_at: (now + Duration::days(1)).into(),
        created_at: now.into(),
        updated_at: now.into(),
    };
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results(vec![vec![(session, user)]; lookups])
        .into_connection();

    AppState::new(db, Storage::new(env), RateLimitConfig::default()).expect("http client")
}

/// Adds the signed-in bearer token to a request builder.
pub fn signed_in(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder.header("authorization", format!("Bearer {SESSION_TOKEN}"))
}

pub async fn send(state: AppState, request: Request<Body>) -> Response {
    create_router(state)
        .oneshot(request)
        .await
        .expect("infallible router")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

pub async fn body_bytes(response: Response) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}
