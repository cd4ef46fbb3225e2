//! Route composition.

use axum::Router;

use crate::api::handlers;
use crate::api::SharedState;

/// Build the application router.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .merge(handlers::distutils::router())
        .nest("/dists", handlers::dists::router())
        .with_state(state)
}
