use std::time::Duration;

use tracing::{info, warn};

use crate::error::TrawlError;
use crate::services::trawl_service::TrawlService;
use crate::sync::{SilentReporter, TrawlSummary};

/// Reconciles a fixed list of terms on an interval.
pub struct TrawlScheduler {
    trawl: TrawlService,
    terms: Vec<String>,
    interval: Duration,
}

impl TrawlScheduler {
    pub fn new(trawl: TrawlService, terms: Vec<String>, interval: Duration) -> Self {
        Self {
            trawl,
            terms,
            interval,
        }
    }

    /// Loops forever, sleeping one interval before each round.
    pub async fn start(self) {
        info!(
            "Starting trawl scheduler for {:?} (interval: {:?})",
            self.terms, self.interval
        );

        loop {
            tokio::time::sleep(self.interval).await;
            self.run_once().await;
        }
    }

    /// Reconciles every configured term once, one after the other. A failed
    /// term is logged and does not stop the others.
    pub async fn run_once(&self) -> Vec<(String, Result<TrawlSummary, TrawlError>)> {
        let mut results = Vec::with_capacity(self.terms.len());

        for term in &self.terms {
            let result = self
                .trawl
                .reconcile_with_progress(term, &SilentReporter)
                .await;
            match &result {
                Ok(summary) => info!(
                    "Scheduled trawl of {} completed - inserted: {}, updated: {}, deleted: {}",
                    term, summary.inserted, summary.updated, summary.deleted
                ),
                Err(e) => warn!("Scheduled trawl of {} failed: {}", term, e),
            }
            results.push((term.clone(), result));
        }

        results
    }
}
