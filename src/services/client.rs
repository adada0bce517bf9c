use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialProvider;
use crate::models::job::{GenerationParams, JobKind};
use crate::models::report::{ArtifactRef, StatusReport, SubmitOutcome};

/// Maximum length of a response body quoted in an error message.
const MAX_ERROR_BODY_LEN: usize = 200;

/// Outbound surface of the generation service. The production binding is
/// [`GenerationClient`]; tests and non-HTTP embeddings substitute their own.
///
/// No retries happen at this layer; retry policy lives in the scheduler.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    /// One `POST /generate/{kind}` call.
    async fn submit(
        &self,
        kind: JobKind,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<SubmitOutcome, ApiError>;

    /// One `GET /generate/{kind}/{id}` call.
    async fn query_status(&self, kind: JobKind, job_id: &str) -> Result<StatusReport, ApiError>;
}

/// Thin reqwest binding for the generation service.
pub struct GenerationClient {
    http: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    prompt: &'a str,
    #[serde(flatten)]
    params: &'a GenerationParams,
}

/// Submission response. The image endpoint may answer synchronously with
/// inline data; the async path answers with a job id.
#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    data: Option<Vec<InlineDatum>>,
}

#[derive(Deserialize)]
struct InlineDatum {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64: Option<String>,
}

#[derive(Deserialize)]
struct PollResponse {
    status: String,
    #[serde(default)]
    generations: Vec<GenerationEntry>,
    #[serde(default)]
    failure_reason: Option<String>,
}

#[derive(Deserialize)]
struct GenerationEntry {
    #[serde(default)]
    video: Option<String>,
    #[serde(default, rename = "contentUrl")]
    content_url: Option<String>,
    #[serde(default)]
    b64: Option<String>,
}

impl GenerationClient {
    pub fn new(base_url: impl Into<String>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            credentials,
        }
    }

    fn endpoint(&self, kind: JobKind) -> String {
        format!("{}/generate/{}", self.base_url.trim_end_matches('/'), kind)
    }

    /// Read the body and classify non-2xx responses by status code.
    async fn read_body(response: reqwest::Response) -> Result<String, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        match classify_status_code(status) {
            Some(err) => Err(err.with_detail(&body)),
            None => Ok(body),
        }
    }
}

#[async_trait]
impl GenerationApi for GenerationClient {
    async fn submit(
        &self,
        kind: JobKind,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<SubmitOutcome, ApiError> {
        let response = self
            .http
            .post(self.endpoint(kind))
            .bearer_auth(self.credentials.bearer_token())
            .json(&SubmitRequest { prompt, params })
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        let parsed: SubmitResponse = serde_json::from_str(&body)?;

        if let Some(id) = parsed.id {
            return Ok(SubmitOutcome::Job { id });
        }
        if let Some(datum) = parsed.data.and_then(|mut d| {
            if d.is_empty() {
                None
            } else {
                Some(d.remove(0))
            }
        }) {
            if let Some(url) = datum.url {
                return Ok(SubmitOutcome::Inline {
                    artifact: ArtifactRef::Media(url),
                });
            }
            if let Some(b64) = datum.b64 {
                return Ok(SubmitOutcome::Inline {
                    artifact: ArtifactRef::Inline(b64),
                });
            }
        }

        Err(ApiError::Decode(serde::de::Error::custom(
            "submission response carried neither a job id nor inline data",
        )))
    }

    async fn query_status(&self, kind: JobKind, job_id: &str) -> Result<StatusReport, ApiError> {
        let response = self
            .http
            .get(format!("{}/{}", self.endpoint(kind), job_id))
            .bearer_auth(self.credentials.bearer_token())
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        let parsed: PollResponse = serde_json::from_str(&body)?;

        let first = parsed.generations.into_iter().next();
        Ok(StatusReport {
            status: parsed.status,
            media_url: first.as_ref().and_then(|g| g.video.clone()),
            content_url: first.as_ref().and_then(|g| g.content_url.clone()),
            inline_b64: first.and_then(|g| g.b64),
            failure_reason: parsed.failure_reason,
        })
    }
}

/// Map a non-2xx status code onto the error taxonomy. 2xx returns None.
fn classify_status_code(status: StatusCode) -> Option<ApiError> {
    if status.is_success() {
        return None;
    }
    Some(match status.as_u16() {
        429 => ApiError::RateLimited,
        401 | 403 => ApiError::Unauthorized {
            status: status.as_u16(),
        },
        s if status.is_server_error() => ApiError::Service { status: s },
        s => ApiError::Rejected {
            status: s,
            detail: String::new(),
        },
    })
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= MAX_ERROR_BODY_LEN {
        trimmed.to_string()
    } else {
        let mut end = MAX_ERROR_BODY_LEN;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        trimmed[..end].to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("rate limited by the generation service")]
    RateLimited,

    #[error("credential rejected by the generation service (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("generation service error (HTTP {status})")]
    Service { status: u16 },

    #[error("request rejected by the generation service (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("network error talking to the generation service: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed response from the generation service: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    fn with_detail(self, body: &str) -> Self {
        match self {
            ApiError::Rejected { status, .. } => ApiError::Rejected {
                status,
                detail: truncate_body(body),
            },
            other => other,
        }
    }

    /// Whether this error is the throttling signal the recovery policy
    /// absorbs during polling.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_classification() {
        assert!(matches!(
            classify_status_code(StatusCode::TOO_MANY_REQUESTS),
            Some(ApiError::RateLimited)
        ));
        assert!(matches!(
            classify_status_code(StatusCode::UNAUTHORIZED),
            Some(ApiError::Unauthorized { status: 401 })
        ));
        assert!(matches!(
            classify_status_code(StatusCode::FORBIDDEN),
            Some(ApiError::Unauthorized { status: 403 })
        ));
        assert!(matches!(
            classify_status_code(StatusCode::BAD_GATEWAY),
            Some(ApiError::Service { status: 502 })
        ));
        assert!(matches!(
            classify_status_code(StatusCode::UNPROCESSABLE_ENTITY),
            Some(ApiError::Rejected { status: 422, .. })
        ));
        assert!(classify_status_code(StatusCode::OK).is_none());
    }

    #[test]
    fn test_error_body_truncated() {
        let long = "x".repeat(500);
        let err = ApiError::Rejected {
            status: 400,
            detail: String::new(),
        }
        .with_detail(&long);
        match err {
            ApiError::Rejected { detail, .. } => assert_eq!(detail.len(), MAX_ERROR_BODY_LEN),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
