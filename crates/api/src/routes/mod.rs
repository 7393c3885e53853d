//! API route definitions.

use axum::{Router, middleware};

use crate::{AppState, middleware::rate_limit};

pub mod download;
pub mod health;
pub mod session;
pub mod stats;
pub mod storage;
pub mod uploads;

/// Creates the router with every route.
///
/// The upload file server and the health and stats endpoints are mounted at
/// both their public paths and under `/api`.
pub fn routes(state: &AppState) -> Router<AppState> {
    let downloads = download::routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit,
    ));

    Router::new()
        .merge(health::routes())
        .merge(stats::routes())
        .merge(uploads::routes(state))
        .merge(session::routes())
        .merge(storage::routes())
        .merge(downloads)
}
