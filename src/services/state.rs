use crate::models::job::JobState;

/// Map a raw service status string onto the job lifecycle.
///
/// Only `succeeded`, `failed`, and `cancelled` (and their common spellings)
/// are recognized as terminal. Every other label — including ones the
/// service has not invented yet — is treated as in-progress so a vocabulary
/// change on the remote side never strands a job in a terminal state it
/// did not reach.
pub fn classify_status(raw: &str) -> JobState {
    match raw.trim().to_ascii_lowercase().as_str() {
        "succeeded" | "completed" => JobState::Succeeded,
        "failed" | "error" => JobState::Failed,
        "cancelled" | "canceled" => JobState::Cancelled,
        "queued" | "pending" => JobState::Queued,
        "preprocessing" => JobState::Preprocessing,
        _ => JobState::Running,
    }
}

/// Apply an observed state on top of the current one. Terminal states are
/// irreversible: once a job has succeeded, failed, or been cancelled, any
/// later observation is discarded.
pub fn advance(current: JobState, observed: JobState) -> JobState {
    if current.is_terminal() {
        current
    } else {
        observed
    }
}
