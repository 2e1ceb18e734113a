use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use game_types::GameId;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum JobKind {
    /// Score the round once the submission grace window has passed
    Finalize,
    /// End a timer-mode round when its time limit runs out
    RoundTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobKey {
    pub game_id: GameId,
    pub round_index: u32,
    pub kind: JobKind,
}

impl JobKey {
    pub fn new(game_id: impl Into<GameId>, round_index: u32, kind: JobKind) -> Self {
        Self {
            game_id: game_id.into(),
            round_index,
            kind,
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({}#{})", self.kind, self.game_id, self.round_index)
    }
}

/// Delayed, cancellable per-round jobs. At most one job exists per key; the
/// entry is dropped right before the job body runs.
#[derive(Clone, Default)]
pub struct JobScheduler {
    jobs: Arc<DashMap<JobKey, JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a job with the same key is already pending
    pub fn schedule<F>(&self, key: JobKey, delay: Duration, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.jobs.entry(key.clone()) {
            Entry::Occupied(_) => {
                debug!("Job {} already scheduled, ignoring duplicate", key);
                false
            }
            Entry::Vacant(slot) => {
                let jobs = self.jobs.clone();
                let job_key = key.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    jobs.remove(&job_key);
                    debug!("Running job {}", job_key);
                    job.await;
                });
                slot.insert(handle);
                debug!("Scheduled job {} in {:?}", key, delay);
                true
            }
        }
    }

    pub fn cancel(&self, key: &JobKey) -> bool {
        match self.jobs.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                debug!("Cancelled job {}", key);
                true
            }
            None => false,
        }
    }

    /// Cancel every pending job of one room
    pub fn cancel_game(&self, game_id: &str) -> usize {
        let keys: Vec<JobKey> = self
            .jobs
            .iter()
            .filter(|entry| entry.key().game_id == game_id)
            .map(|entry| entry.key().clone())
            .collect();
        keys.iter().filter(|key| self.cancel(key)).count()
    }

    pub fn cancel_all(&self) -> usize {
        let keys: Vec<JobKey> = self.jobs.iter().map(|entry| entry.key().clone()).collect();
        let cancelled = keys.iter().filter(|key| self.cancel(key)).count();
        if cancelled > 0 {
            info!("Cancelled {} pending jobs", cancelled);
        }
        cancelled
    }

    pub fn is_pending(&self, key: &JobKey) -> bool {
        self.jobs.contains_key(key)
    }

    pub fn pending(&self) -> Vec<JobKey> {
        let mut keys: Vec<JobKey> = self.jobs.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }
}
