use std::sync::Arc;

use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::credentials::StaticCredential;
use crate::models::job::{GenerationJob, GenerationParams, JobKind, JobState};
use crate::models::report::SubmitOutcome;
use crate::services::backoff::RateLimitPolicy;
use crate::services::client::{ApiError, GenerationApi, GenerationClient};
use crate::services::ledger::JobLedger;
use crate::services::resolver::{ResolveError, ResolvedMedia, ResultResolver};
use crate::services::scheduler::{poll_until_terminal, PollCadence, PollContext, PollScheduler};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("unknown job {0}")]
    UnknownJob(Uuid),
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("unknown job {0}")]
    UnknownJob(Uuid),

    #[error("job {0} has no resolved result to fall back from")]
    NotResolved(Uuid),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Register metric descriptions. Hosts that install a metrics recorder call
/// this once at startup.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "generation_jobs_submitted_total",
        "Total generation jobs submitted"
    );
    metrics::describe_counter!(
        "generation_jobs_succeeded_total",
        "Total generation jobs that resolved a usable artifact"
    );
    metrics::describe_counter!(
        "generation_jobs_failed_total",
        "Total generation jobs that failed"
    );
    metrics::describe_counter!(
        "generation_jobs_cancelled_total",
        "Total generation jobs cancelled"
    );
    metrics::describe_counter!(
        "generation_rate_limit_retries_total",
        "Total 429 backoff retries during polling"
    );
    metrics::describe_gauge!(
        "generation_jobs_active",
        "Jobs currently in a non-terminal state"
    );
    metrics::describe_histogram!(
        "generation_poll_duration_seconds",
        "Latency of status poll requests"
    );
}

/// Facade over the generation-job subsystem: submits requests, runs one
/// poll task per async job, and exposes the ledger to the presentation
/// layer. Cheap to share behind an `Arc`.
pub struct Orchestrator {
    api: Arc<dyn GenerationApi>,
    ledger: Arc<JobLedger>,
    scheduler: PollScheduler,
    resolver: Arc<ResultResolver>,
    cadence: PollCadence,
    policy: RateLimitPolicy,
}

impl Orchestrator {
    /// Production wiring: reqwest client and the default resolver ladder,
    /// both using the configured credential.
    pub fn new(config: &OrchestratorConfig) -> Result<Self, ResolveError> {
        let credentials = Arc::new(StaticCredential::new(config.api_token.clone()));
        let api = Arc::new(GenerationClient::new(
            config.api_base_url.clone(),
            credentials.clone(),
        ));
        let resolver = ResultResolver::for_service(&config.api_base_url, credentials)?;
        Ok(Self::with_api(
            api,
            resolver,
            PollCadence::from(config),
            RateLimitPolicy::new(config.rate_limit_base(), config.rate_limit_max_retries),
        ))
    }

    /// Wiring seam for tests and non-HTTP embeddings.
    pub fn with_api(
        api: Arc<dyn GenerationApi>,
        resolver: ResultResolver,
        cadence: PollCadence,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            api,
            ledger: Arc::new(JobLedger::new()),
            scheduler: PollScheduler::new(),
            resolver: Arc::new(resolver),
            cadence,
            policy,
        }
    }

    fn poll_context(&self) -> PollContext {
        PollContext {
            api: self.api.clone(),
            ledger: self.ledger.clone(),
            resolver: self.resolver.clone(),
            policy: self.policy,
            cadence: self.cadence,
        }
    }

    /// Submit a generation request. The job record exists in the ledger from
    /// this point on, whatever the outcome; a rejected submission is marked
    /// `Failed` and the error returned for immediate display.
    pub async fn submit(
        &self,
        kind: JobKind,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<Uuid, SubmitError> {
        let job = GenerationJob::new(kind, prompt, params.clone());
        let job_id = job.id;
        self.ledger.insert(job);
        metrics::counter!("generation_jobs_submitted_total").increment(1);
        self.ledger.record_active_gauge();
        tracing::info!(job_id = %job_id, kind = %kind, "submitting generation job");

        match self.api.submit(kind, prompt, &params).await {
            Ok(SubmitOutcome::Job { id }) => {
                self.ledger.set_remote_id(job_id, id.clone());
                tracing::info!(job_id = %job_id, remote_id = %id, "job accepted, polling");
                self.scheduler.spawn(
                    job_id,
                    poll_until_terminal(job_id, id, kind, self.poll_context()),
                );
                Ok(job_id)
            }
            Ok(SubmitOutcome::Inline { artifact }) => {
                // Synchronous path: no polling ever happens for this job.
                match self.resolver.resolve(Some(&artifact), kind) {
                    Ok(resolved) => {
                        self.ledger.complete(
                            job_id,
                            Some(artifact),
                            resolved.url.clone(),
                            resolved.mode,
                        );
                        metrics::counter!("generation_jobs_succeeded_total").increment(1);
                        self.ledger.record_active_gauge();
                        tracing::info!(job_id = %job_id, url = %resolved.url, "job succeeded inline");
                        Ok(job_id)
                    }
                    Err(err) => {
                        self.ledger.fail(job_id, err.to_string());
                        metrics::counter!("generation_jobs_failed_total").increment(1);
                        self.ledger.record_active_gauge();
                        tracing::warn!(job_id = %job_id, error = %err, "inline result unresolvable");
                        Err(err.into())
                    }
                }
            }
            Err(err) => {
                self.ledger.fail(job_id, err.to_string());
                metrics::counter!("generation_jobs_failed_total").increment(1);
                self.ledger.record_active_gauge();
                tracing::warn!(job_id = %job_id, error = %err, "submission rejected");
                Err(err.into())
            }
        }
    }

    /// Client-side cancellation: stop observing the job and mark it
    /// terminal. Idempotent; the remote job may keep running server-side.
    /// Takes effect before the next scheduled tick, and a query already in
    /// flight is discarded rather than applied.
    pub fn cancel(&self, job_id: Uuid) {
        self.scheduler.stop(job_id);
        if self.ledger.cancel(job_id) {
            metrics::counter!("generation_jobs_cancelled_total").increment(1);
            self.ledger.record_active_gauge();
            tracing::info!(job_id = %job_id, "job cancelled");
        }
    }

    /// Resubmit with the same prompt and parameters as a prior job.
    pub async fn regenerate(&self, job_id: Uuid) -> Result<Uuid, SubmitError> {
        let job = self
            .ledger
            .get(job_id)
            .ok_or(SubmitError::UnknownJob(job_id))?;
        self.submit(job.kind, &job.prompt, job.params).await
    }

    /// Resubmit with a prompt derived from a prior job's result.
    pub async fn modify(&self, job_id: Uuid, instruction: &str) -> Result<Uuid, SubmitError> {
        let job = self
            .ledger
            .get(job_id)
            .ok_or(SubmitError::UnknownJob(job_id))?;
        let derived = format!(
            "{instruction} (building on the earlier {} generated from: \"{}\")",
            job.kind, job.prompt
        );
        self.submit(job.kind, &derived, job.params).await
    }

    /// The consumer rejected the resolved URL at render time. Exactly one
    /// fallback escalation is attempted automatically; after that — or when
    /// the artifact has no further variant — `PlaybackUnavailable` is
    /// surfaced and the job stays `Succeeded` so it remains clear the
    /// generation itself worked.
    pub fn playback_rejected(&self, job_id: Uuid) -> Result<String, PlaybackError> {
        let job = self
            .ledger
            .get(job_id)
            .ok_or(PlaybackError::UnknownJob(job_id))?;
        if job.state != JobState::Succeeded {
            return Err(PlaybackError::NotResolved(job_id));
        }
        let (Some(artifact), Some(url), Some(mode)) =
            (job.result_ref, job.resolved_url, job.resolve_mode)
        else {
            return Err(PlaybackError::NotResolved(job_id));
        };
        if job.playback_fallback_used {
            return Err(ResolveError::PlaybackUnavailable.into());
        }

        let current = ResolvedMedia { url, mode };
        match self.resolver.fallback(&artifact, &current) {
            Some(next) => {
                self.ledger
                    .apply_fallback(job_id, next.url.clone(), next.mode);
                tracing::info!(
                    job_id = %job_id,
                    mode = ?next.mode,
                    "playback rejected, switching URL variant"
                );
                Ok(next.url)
            }
            None => {
                self.ledger.spend_fallback(job_id);
                tracing::warn!(job_id = %job_id, "playback rejected, no variant left");
                Err(ResolveError::PlaybackUnavailable.into())
            }
        }
    }

    pub fn job(&self, job_id: Uuid) -> Option<GenerationJob> {
        self.ledger.get(job_id)
    }

    /// All jobs, oldest first, for the presentation layer.
    pub fn jobs(&self) -> Vec<GenerationJob> {
        self.ledger.jobs()
    }

    pub fn active_count(&self) -> usize {
        self.ledger.active_count()
    }

    /// Wall-clock age of a job, surfaced for UX.
    pub fn elapsed(&self, job_id: Uuid) -> Option<chrono::Duration> {
        self.ledger.get(job_id).map(|job| job.elapsed())
    }

    /// Whether a poll task is currently registered for the job.
    pub fn is_polling(&self, job_id: Uuid) -> bool {
        self.scheduler.is_active(job_id)
    }
}
