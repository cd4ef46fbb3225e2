//! API module - HTTP handlers and routing.

pub mod handlers;
pub mod routes;

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::storage::ArtifactStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub store: Arc<dyn ArtifactStore>,
}

impl AppState {
    pub fn new(config: Config, db: PgPool, store: Arc<dyn ArtifactStore>) -> Self {
        Self { config, db, store }
    }
}

pub type SharedState = Arc<AppState>;
