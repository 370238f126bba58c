use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::models::{ReviewDecision, RunRecord};
use crate::services::scheduling::SlotInventory;
use crate::services::workflow::{Workflow, WorkflowError};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("run {0} not found")]
    NotFound(Uuid),

    #[error("run {0} is already being resumed")]
    Busy(Uuid),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// Owns every run plus the shared slot inventory they all draw from.
pub struct Scheduler {
    workflow: Workflow,
    inventory: Arc<SlotInventory>,
    runs: Mutex<HashMap<Uuid, RunRecord>>,
    resuming: Mutex<HashSet<Uuid>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Scheduler {
    pub fn new(workflow: Workflow, inventory: Arc<SlotInventory>) -> Self {
        Self {
            workflow,
            inventory,
            runs: Mutex::new(HashMap::new()),
            resuming: Mutex::new(HashSet::new()),
        }
    }

    pub fn inventory(&self) -> &SlotInventory {
        &self.inventory
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Runs a new request until it finishes or waits for review, then stores it.
    pub async fn start(&self, raw_email: &str) -> RunRecord {
        let run = self.workflow.start(raw_email, &self.inventory).await;
        lock(&self.runs).insert(run.id, run.clone());
        run
    }

    pub async fn resume(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        feedback: Option<String>,
    ) -> Result<RunRecord, RunError> {
        if !lock(&self.resuming).insert(id) {
            return Err(RunError::Busy(id));
        }
        let Some(run) = self.get(id) else {
            lock(&self.resuming).remove(&id);
            return Err(RunError::NotFound(id));
        };

        let result = self
            .workflow
            .resume(run, decision, feedback, &self.inventory)
            .await;
        if let Ok(run) = &result {
            lock(&self.runs).insert(id, run.clone());
        }
        lock(&self.resuming).remove(&id);

        Ok(result?)
    }

    pub fn get(&self, id: Uuid) -> Option<RunRecord> {
        lock(&self.runs).get(&id).cloned()
    }

    /// All runs, newest first.
    pub fn list(&self) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = lock(&self.runs).values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs
    }

    /// Closes every run that has waited on a reviewer for longer than `timeout`. Returns how
    /// many were expired.
    pub fn expire_stale_reviews(&self, timeout: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(timeout) else {
            return 0;
        };
        let cutoff = Utc::now().naive_utc() - max_age;
        // `resume` marks a run busy before reading it, so the busy set is read under `runs`
        let mut runs = lock(&self.runs);
        let stale: Vec<Uuid> = {
            let resuming = lock(&self.resuming);
            runs.values()
                .filter(|r| r.awaiting_review() && r.updated_at <= cutoff && !resuming.contains(&r.id))
                .map(|r| r.id)
                .collect()
        };

        let mut expired = 0;
        for id in stale {
            let Some(run) = runs.remove(&id) else {
                continue;
            };
            match self.workflow.expire(run.clone(), timeout) {
                Ok(closed) => {
                    runs.insert(id, closed);
                    expired += 1;
                }
                Err(e) => {
                    tracing::warn!(run_id = %id, error = %e, "could not expire run");
                    runs.insert(id, run);
                }
            }
        }
        expired
    }
}
