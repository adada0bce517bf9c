use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use crate::models::job::{GenerationJob, JobState};
use crate::models::report::{ArtifactRef, ResolveMode};
use crate::services::state;

/// In-memory record of every job the orchestrator has seen. Jobs reaching a
/// terminal state leave the active set but stay in the ledger for display,
/// download, regenerate, and modify actions.
///
/// All mutation funnels through the guarded methods below. Once a job is
/// terminal every further transition attempt is a no-op — that is also what
/// discards an in-flight poll result that lands after cancellation.
pub struct JobLedger {
    jobs: Mutex<HashMap<Uuid, GenerationJob>>,
}

impl JobLedger {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<Uuid, GenerationJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, job: GenerationJob) {
        self.guard().insert(job.id, job);
    }

    pub fn get(&self, id: Uuid) -> Option<GenerationJob> {
        self.guard().get(&id).cloned()
    }

    /// All jobs, oldest submission first.
    pub fn jobs(&self) -> Vec<GenerationJob> {
        let mut all: Vec<_> = self.guard().values().cloned().collect();
        all.sort_by_key(|j| j.submitted_at);
        all
    }

    pub fn active_count(&self) -> usize {
        self.guard()
            .values()
            .filter(|j| j.state.is_in_progress())
            .count()
    }

    pub(crate) fn record_active_gauge(&self) {
        metrics::gauge!("generation_jobs_active").set(self.active_count() as f64);
    }

    pub fn set_remote_id(&self, id: Uuid, remote_id: String) {
        if let Some(job) = self.guard().get_mut(&id) {
            job.remote_id = Some(remote_id);
        }
    }

    /// Record an observed in-progress state. Terminal jobs are untouched;
    /// terminal observations go through `complete`/`fail`/`cancel` instead.
    /// Returns the state actually recorded.
    pub fn advance(&self, id: Uuid, observed: JobState) -> Option<JobState> {
        let mut jobs = self.guard();
        let job = jobs.get_mut(&id)?;
        if observed.is_in_progress() {
            job.state = state::advance(job.state, observed);
        }
        Some(job.state)
    }

    /// Terminal success: records the raw artifact and the resolved URL.
    /// Returns false (no-op) if the job is unknown or already terminal.
    pub fn complete(
        &self,
        id: Uuid,
        artifact: Option<ArtifactRef>,
        url: String,
        mode: ResolveMode,
    ) -> bool {
        let mut jobs = self.guard();
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };
        if job.state.is_terminal() {
            return false;
        }
        job.state = JobState::Succeeded;
        job.result_ref = artifact;
        job.resolved_url = Some(url);
        job.resolve_mode = Some(mode);
        job.failure_reason = None;
        true
    }

    /// Terminal failure with a reason. Returns false if already terminal.
    pub fn fail(&self, id: Uuid, reason: impl Into<String>) -> bool {
        let mut jobs = self.guard();
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };
        if job.state.is_terminal() {
            return false;
        }
        job.state = JobState::Failed;
        job.failure_reason = Some(reason.into());
        job.resolved_url = None;
        job.resolve_mode = None;
        true
    }

    /// Client-side cancellation: terminal, no failure reason. Idempotent —
    /// cancelling a terminal job returns false and changes nothing.
    pub fn cancel(&self, id: Uuid) -> bool {
        let mut jobs = self.guard();
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };
        if job.state.is_terminal() {
            return false;
        }
        job.state = JobState::Cancelled;
        job.failure_reason = None;
        true
    }

    /// Bump the consecutive rate-limit counter, returning the new count.
    pub fn increment_retry(&self, id: Uuid) -> Option<u32> {
        let mut jobs = self.guard();
        let job = jobs.get_mut(&id)?;
        job.retry_count = job.retry_count.saturating_add(1);
        Some(job.retry_count)
    }

    /// Any non-429 response resets the consecutive counter.
    pub fn reset_retry(&self, id: Uuid) {
        if let Some(job) = self.guard().get_mut(&id) {
            job.retry_count = 0;
        }
    }

    /// Record the playback-fallback URL variant on a succeeded job and mark
    /// the single automatic escalation as spent.
    pub fn apply_fallback(&self, id: Uuid, url: String, mode: ResolveMode) -> bool {
        let mut jobs = self.guard();
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };
        if job.state != JobState::Succeeded {
            return false;
        }
        job.resolved_url = Some(url);
        job.resolve_mode = Some(mode);
        job.playback_fallback_used = true;
        true
    }

    /// Mark the fallback as spent without a new variant (nothing further to
    /// try for this artifact).
    pub fn spend_fallback(&self, id: Uuid) {
        if let Some(job) = self.guard().get_mut(&id) {
            job.playback_fallback_used = true;
        }
    }
}

impl Default for JobLedger {
    fn default() -> Self {
        Self::new()
    }
}
