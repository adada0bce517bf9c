use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::models::job::{JobKind, JobState};
use crate::models::report::StatusReport;
use crate::services::backoff::RateLimitPolicy;
use crate::services::client::{ApiError, GenerationApi};
use crate::services::ledger::JobLedger;
use crate::services::resolver::ResultResolver;
use crate::services::state;

/// Poll intervals tiered by elapsed time since submission. Generation
/// latency grows with media complexity: short intervals early keep the UX
/// responsive, longer intervals later cut request volume and rate-limit
/// pressure.
#[derive(Debug, Clone, Copy)]
pub struct PollCadence {
    pub initial: Duration,
    pub steady: Duration,
    pub late: Duration,
    pub late_after: Duration,
}

impl From<&OrchestratorConfig> for PollCadence {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            initial: config.poll_initial(),
            steady: config.poll_steady(),
            late: config.poll_late(),
            late_after: config.poll_late_after(),
        }
    }
}

impl Default for PollCadence {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10),
            steady: Duration::from_secs(15),
            late: Duration::from_secs(20),
            late_after: Duration::from_secs(120),
        }
    }
}

/// Interval to sleep before the next status query. `completed_ticks` counts
/// timer ticks already taken (the immediate post-submission query is not a
/// tick).
pub(crate) fn poll_interval(
    elapsed: Duration,
    completed_ticks: u64,
    cadence: &PollCadence,
) -> Duration {
    if elapsed >= cadence.late_after {
        cadence.late
    } else if completed_ticks >= 1 {
        cadence.steady
    } else {
        cadence.initial
    }
}

/// Everything a per-job poll task needs.
#[derive(Clone)]
pub(crate) struct PollContext {
    pub api: Arc<dyn GenerationApi>,
    pub ledger: Arc<JobLedger>,
    pub resolver: Arc<ResultResolver>,
    pub policy: RateLimitPolicy,
    pub cadence: PollCadence,
}

/// Owns one recurring poll task per active job, keyed by job identity.
/// Tasks for different jobs are independent and never share a clock;
/// cancellation aborts by key.
pub struct PollScheduler {
    tasks: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<Uuid, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register and run the poll task for `job_id`. Exactly one live entry
    /// per job identity: a stale entry for the same key is aborted.
    pub(crate) fn spawn<F>(&self, job_id: Uuid, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.guard();
        tasks.retain(|_, handle| !handle.is_finished());
        if let Some(old) = tasks.insert(job_id, tokio::spawn(task)) {
            old.abort();
        }
    }

    /// Abort and deregister the poll task for `job_id`. Returns false when
    /// no task was registered (already terminal, or synchronous result).
    pub fn stop(&self, job_id: Uuid) -> bool {
        match self.guard().remove(&job_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, job_id: Uuid) -> bool {
        self.guard()
            .get(&job_id)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn active_jobs(&self) -> usize {
        self.guard()
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive one job's status queries until a terminal state or cancellation.
///
/// The first query fires immediately after submission. Queries for a job
/// are strictly sequential — the loop awaits each one before sleeping for
/// the next tick, so there is never more than one in flight and ticks are
/// skipped rather than queued. A 429 reply takes the bounded-backoff path
/// in place of the next scheduled tick.
pub(crate) async fn poll_until_terminal(
    job_id: Uuid,
    remote_id: String,
    kind: JobKind,
    ctx: PollContext,
) {
    let started = Instant::now();
    let mut ticks: u64 = 0;

    loop {
        // Cancellation (or any other terminal transition) between ticks
        // ends the task before another query is issued.
        match ctx.ledger.get(job_id) {
            Some(job) if job.state.is_in_progress() => {}
            _ => break,
        }

        let query_started = Instant::now();
        let result = ctx.api.query_status(kind, &remote_id).await;
        metrics::histogram!("generation_poll_duration_seconds")
            .record(query_started.elapsed().as_secs_f64());

        match result {
            Ok(report) => {
                ctx.ledger.reset_retry(job_id);
                let observed = state::classify_status(&report.status);
                tracing::debug!(
                    job_id = %job_id,
                    raw_status = %report.status,
                    state = %observed,
                    elapsed_secs = started.elapsed().as_secs(),
                    "status report"
                );

                match observed {
                    JobState::Succeeded => {
                        finish_success(&ctx, job_id, kind, &report);
                        break;
                    }
                    JobState::Failed => {
                        let reason = report
                            .failure_reason
                            .clone()
                            .unwrap_or_else(|| "generation failed".to_string());
                        if ctx.ledger.fail(job_id, reason.clone()) {
                            metrics::counter!("generation_jobs_failed_total").increment(1);
                            tracing::warn!(job_id = %job_id, reason = %reason, "job failed remotely");
                        }
                        break;
                    }
                    JobState::Cancelled => {
                        if ctx.ledger.cancel(job_id) {
                            metrics::counter!("generation_jobs_cancelled_total").increment(1);
                            tracing::info!(job_id = %job_id, "job cancelled remotely");
                        }
                        break;
                    }
                    in_progress => {
                        ctx.ledger.advance(job_id, in_progress);
                    }
                }
            }
            Err(ApiError::RateLimited) => {
                let Some(retry_count) = ctx.ledger.increment_retry(job_id) else {
                    break;
                };
                metrics::counter!("generation_rate_limit_retries_total").increment(1);

                match ctx.policy.delay_for(retry_count) {
                    Some(delay) => {
                        tracing::warn!(
                            job_id = %job_id,
                            retry_count,
                            delay_secs = delay.as_secs(),
                            "rate limited, backing off"
                        );
                        // Supersedes the next scheduled tick.
                        sleep(delay).await;
                        continue;
                    }
                    None => {
                        if ctx.ledger.fail(
                            job_id,
                            format!(
                                "generation service overloaded, gave up after {} retries",
                                ctx.policy.max_retries()
                            ),
                        ) {
                            metrics::counter!("generation_jobs_failed_total").increment(1);
                            tracing::warn!(
                                job_id = %job_id,
                                retry_count,
                                "rate-limit retries exhausted"
                            );
                        }
                        break;
                    }
                }
            }
            Err(err) => {
                // Auth, service, transport, decode: fatal for this attempt.
                // The user may resubmit manually.
                if ctx.ledger.fail(job_id, err.to_string()) {
                    metrics::counter!("generation_jobs_failed_total").increment(1);
                    tracing::error!(job_id = %job_id, error = %err, "polling aborted");
                }
                break;
            }
        }

        let delay = poll_interval(started.elapsed(), ticks, &ctx.cadence);
        ticks += 1;
        sleep(delay).await;
    }

    ctx.ledger.record_active_gauge();
}

/// Resolve the terminal report's artifact and record the outcome.
fn finish_success(ctx: &PollContext, job_id: Uuid, kind: JobKind, report: &StatusReport) {
    let artifact = report.primary_artifact();
    match ctx.resolver.resolve(artifact.as_ref(), kind) {
        Ok(resolved) => {
            if ctx
                .ledger
                .complete(job_id, artifact, resolved.url.clone(), resolved.mode)
            {
                metrics::counter!("generation_jobs_succeeded_total").increment(1);
                tracing::info!(job_id = %job_id, url = %resolved.url, "job succeeded");
            }
        }
        Err(err) => {
            if ctx.ledger.fail(job_id, err.to_string()) {
                metrics::counter!("generation_jobs_failed_total").increment(1);
                tracing::warn!(job_id = %job_id, error = %err, "succeeded remotely but unresolvable");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_tiers() {
        let cadence = PollCadence::default();
        // First tick after the immediate query.
        assert_eq!(
            poll_interval(Duration::from_secs(0), 0, &cadence),
            Duration::from_secs(10)
        );
        // After the first tick.
        assert_eq!(
            poll_interval(Duration::from_secs(10), 1, &cadence),
            Duration::from_secs(15)
        );
        assert_eq!(
            poll_interval(Duration::from_secs(60), 4, &cadence),
            Duration::from_secs(15)
        );
        // Past the late threshold.
        assert_eq!(
            poll_interval(Duration::from_secs(120), 8, &cadence),
            Duration::from_secs(20)
        );
        assert_eq!(
            poll_interval(Duration::from_secs(600), 30, &cadence),
            Duration::from_secs(20)
        );
    }

    #[test]
    fn test_late_threshold_beats_tick_count() {
        let cadence = PollCadence::default();
        // Even the first tick takes the late interval if the job is old.
        assert_eq!(
            poll_interval(Duration::from_secs(180), 0, &cadence),
            Duration::from_secs(20)
        );
    }
}
