//! Current session endpoint.

use axum::{Json, Router, routing::get};

use crate::{AppState, context::{RequestContext, SessionUser}};

/// Creates session routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/api/session", get(current_session))
}

/// GET `/api/session`: the signed-in user or `null`.
async fn current_session(ctx: RequestContext) -> Json<Option<SessionUser>> {
    Json(ctx.user)
}
