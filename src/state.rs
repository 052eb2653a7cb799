use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::{SearchConfig, TrawlConfig};
use crate::db::CourseStore;
use crate::roster::RosterClient;
use crate::services::{SearchService, TermLocks, TrawlService};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub store: Arc<dyn CourseStore>,
    pub roster: Arc<dyn RosterClient>,
    pub locks: TermLocks,
    pub search: SearchConfig,
    pub trawl: TrawlConfig,
}

impl AppState {
    pub fn search_service(&self) -> SearchService {
        SearchService::new(self.store.clone())
    }

    /// Shares the term locks with every other trawl started from this state.
    pub fn trawl_service(&self) -> TrawlService {
        TrawlService::with_config(
            self.store.clone(),
            self.roster.clone(),
            self.locks.clone(),
            self.trawl.clone(),
        )
    }
}
