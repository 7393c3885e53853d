//! Per-request context shared by session-aware handlers.
//!
//! [`RequestContext`] never rejects: a missing, expired or unverifiable
//! session simply leaves `user` empty. [`AuthenticatedContext`] is the
//! variant for handlers that require a user and rejects with 401.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use axum_extra::extract::CookieJar;
use kan_db::SessionRepository;
use kan_db::entities::users;
use kan_shared::AppError;
use sea_orm::{DatabaseConnection, DbErr};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "kan.session_token";

/// Connection-scoped headers that are never forwarded to procedures.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Request headers as a flat name -> value map.
///
/// Names are lower-case, repeated headers are joined with `", "`, values
/// that are not valid UTF-8 are dropped, and hop-by-hop headers (including
/// any named in `Connection`) are removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizedHeaders(BTreeMap<String, String>);

impl NormalizedHeaders {
    /// Normalizes a header map.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let connection_listed: Vec<String> = headers
            .get_all("connection")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();

        let mut map = BTreeMap::new();
        for name in headers.keys() {
            let name = name.as_str();
            if HOP_BY_HOP.contains(&name) || connection_listed.iter().any(|c| c == name) {
                continue;
            }

            let values: Vec<&str> = headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();
            if !values.is_empty() {
                map.insert(name.to_string(), values.join(", "));
            }
        }
        Self(map)
    }

    /// Header value by case-insensitive name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no headers remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The signed-in user as exposed to handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    /// User ID.
    pub id: Uuid,
    /// Display name.
    pub name: Option<String>,
    /// Email address.
    pub email: String,
    /// Avatar URL or storage key.
    pub image: Option<String>,
}

impl From<users::Model> for SessionUser {
    fn from(user: users::Model) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            image: user.image,
        }
    }
}

/// Session lookups for the request context.
#[derive(Debug, Clone)]
pub struct AuthFacade {
    sessions: SessionRepository,
}

impl AuthFacade {
    /// Creates a facade over the given connection.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self {
            sessions: SessionRepository::new(db),
        }
    }

    /// Extracts the session token from `Authorization: Bearer` or the session cookie.
    #[must_use]
    pub fn session_token(headers: &HeaderMap) -> Option<String> {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        if let Some(token) = bearer {
            return Some(token.to_string());
        }

        CookieJar::from_headers(headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Resolves the user owning an active session token.
    ///
    /// # Errors
    ///
    /// Returns an error if the session query fails.
    pub async fn user_for_token(&self, token: &str) -> Result<Option<SessionUser>, DbErr> {
        Ok(self
            .sessions
            .find_active_by_token(token)
            .await?
            .map(|found| SessionUser::from(found.user)))
    }

    /// Resolves the session user of a request, logging lookup failures.
    pub async fn user_for_request(&self, headers: &HeaderMap) -> Option<SessionUser> {
        let token = Self::session_token(headers)?;
        match self.user_for_token(&token).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Session lookup failed");
                None
            }
        }
    }
}

/// Context built for every session-aware request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Normalized request headers.
    pub headers: NormalizedHeaders,
    /// Shared database handle.
    pub db: Arc<DatabaseConnection>,
    /// Session lookups.
    pub auth: AuthFacade,
    /// The signed-in user, if any.
    pub user: Option<SessionUser>,
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthFacade::new((*state.db).clone());
        let user = auth.user_for_request(&parts.headers).await;

        Ok(Self {
            headers: NormalizedHeaders::from_headers(&parts.headers),
            db: Arc::clone(&state.db),
            auth,
            user,
        })
    }
}

/// Request context with a guaranteed user.
#[derive(Debug, Clone)]
pub struct AuthenticatedContext {
    /// The underlying request context.
    pub context: RequestContext,
    /// The signed-in user.
    pub user: SessionUser,
}

impl FromRequestParts<AppState> for AuthenticatedContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Ok(context) = RequestContext::from_request_parts(parts, state).await;
        let user = context
            .user
            .clone()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

        Ok(Self { context, user })
    }
}
