use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use stepflow_core::error::{Result, StepflowError};
use stepflow_core::types::RunId;

use crate::run::RunHandle;

/// Process-scoped map of run id to run handle.
///
/// The map lock is held only for insert and lookup; reading a run goes
/// through its own handle.
#[derive(Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<RunId, Arc<RunHandle>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: Arc<RunHandle>) {
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.run_id().clone(), handle);
    }

    pub fn get(&self, run_id: &RunId) -> Result<Arc<RunHandle>> {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .cloned()
            .ok_or_else(|| StepflowError::RunNotFound(run_id.to_string()))
    }

    /// All runs, oldest first.
    pub fn list(&self) -> Vec<Arc<RunHandle>> {
        let mut runs: Vec<Arc<RunHandle>> = self
            .runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        runs.sort_by_key(|h| h.created_at());
        runs
    }
}
