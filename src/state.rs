use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::{clock::Clock, config::Config, notifier::ResetNotifier};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn ResetNotifier>,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
