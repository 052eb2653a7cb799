use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// One async mutex per term, so that no two reconciliations of the same
/// term overlap while different terms still run in parallel.
#[derive(Clone, Default)]
pub struct TermLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl TermLocks {
    fn entry(&self, term: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(term.to_string()).or_default().clone()
    }

    /// Waits until the term is free.
    pub async fn acquire(&self, term: &str) -> OwnedMutexGuard<()> {
        self.entry(term).lock_owned().await
    }

    /// Returns `None` if a run for the term is in progress.
    pub fn try_acquire(&self, term: &str) -> Option<OwnedMutexGuard<()>> {
        self.entry(term).try_lock_owned().ok()
    }
}
