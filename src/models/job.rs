use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::report::{ArtifactRef, ResolveMode};

/// Media kind a job produces. The string form is used in service URL paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Image,
    Video,
}

/// Lifecycle state of a generation job.
///
/// `Queued`, `Preprocessing`, and `Running` are the remote service's
/// intermediate vocabulary; the scheduler treats them identically (keep
/// polling) and they are kept distinct only for display and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Queued,
    Preprocessing,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn is_in_progress(self) -> bool {
        !self.is_terminal()
    }
}

/// Generation parameters captured at submission time. Immutable for the
/// lifetime of the job; `regenerate` reuses them verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,

    /// Video length in seconds. Ignored by the image endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
}

/// One remote generation request tracked by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Local identity: ledger key and scheduler registry key.
    pub id: Uuid,

    /// Identifier assigned by the remote service. Absent for synchronous
    /// image results, which never enter the polling loop.
    pub remote_id: Option<String>,

    pub kind: JobKind,
    pub prompt: String,
    pub params: GenerationParams,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,

    /// Consecutive rate-limit retries. Reset to zero by any non-429 response.
    pub retry_count: u32,

    /// Raw artifact reference from the terminal status report.
    pub result_ref: Option<ArtifactRef>,

    /// Consumer-facing URL. Set if and only if `state == Succeeded`.
    pub resolved_url: Option<String>,

    /// Which resolution variant produced `resolved_url`.
    pub resolve_mode: Option<ResolveMode>,

    /// Whether the single automatic playback fallback has been spent.
    pub playback_fallback_used: bool,

    /// Present only in the `Failed` state.
    pub failure_reason: Option<String>,
}

impl GenerationJob {
    pub fn new(kind: JobKind, prompt: impl Into<String>, params: GenerationParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote_id: None,
            kind,
            prompt: prompt.into(),
            params,
            state: JobState::Submitted,
            submitted_at: Utc::now(),
            retry_count: 0,
            result_ref: None,
            resolved_url: None,
            resolve_mode: None,
            playback_fallback_used: false,
            failure_reason: None,
        }
    }

    /// Wall-clock age of the job, surfaced to the consumer for UX.
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.submitted_at
    }

    /// Suggested filename for the consumer's download action.
    pub fn download_name(&self) -> String {
        let ext = match self.kind {
            JobKind::Image => "png",
            JobKind::Video => "mp4",
        };
        format!("generation-{}.{}", self.id.simple(), ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Submitted.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Preprocessing.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn test_kind_path_segment() {
        assert_eq!(JobKind::Image.to_string(), "image");
        assert_eq!(JobKind::Video.to_string(), "video");
    }

    #[test]
    fn test_new_job_defaults() {
        let job = GenerationJob::new(JobKind::Video, "a red balloon", GenerationParams::default());
        assert_eq!(job.state, JobState::Submitted);
        assert_eq!(job.retry_count, 0);
        assert!(job.remote_id.is_none());
        assert!(job.resolved_url.is_none());
        assert!(!job.playback_fallback_used);
    }

    #[test]
    fn test_download_name_extension() {
        let image = GenerationJob::new(JobKind::Image, "p", GenerationParams::default());
        let video = GenerationJob::new(JobKind::Video, "p", GenerationParams::default());
        assert!(image.download_name().ends_with(".png"));
        assert!(video.download_name().ends_with(".mp4"));
    }
}
