use std::sync::Arc;
use parley_shared::db::Db;

use crate::provider::AiProvider;

/// Everything a request handler needs, shared across the router.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub provider: Arc<dyn AiProvider>,
}

impl AppState {
    pub fn new(db: Db, provider: Arc<dyn AiProvider>) -> Arc<Self> {
        Arc::new(Self { db, provider })
    }
}
