use sea_orm::DatabaseConnection;

use crate::things::ThingsCache;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub things_cache: ThingsCache,
}

impl AppState {
    pub fn new(db: DatabaseConnection, things_cache: ThingsCache) -> Self {
        Self { db, things_cache }
    }
}
