//! Application state shared across handlers.

use std::sync::Arc;
use tessera_core::EngineConfig;
use tessera_db::Database;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<EngineConfig>,
}

impl AppState {
    pub fn new(db: Arc<Database>, config: Arc<EngineConfig>) -> Self {
        Self { db, config }
    }
}
