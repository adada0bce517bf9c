use serde::{Deserialize, Serialize};

/// Raw pointer to generated media as returned by the service. May require
/// resolution before the consumer can load it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRef {
    /// Direct media reference (the `video` field of a poll report, or the
    /// `url` field of a synchronous image response).
    Media(String),

    /// Secondary content reference (the `contentUrl` field).
    Content(String),

    /// Inline base64-encoded payload, self-contained once wrapped as a
    /// data URL.
    Inline(String),
}

/// Outcome of submitting a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Async path: the service accepted the request and assigned a job id
    /// to poll. Used by video and optionally by image.
    Job { id: String },

    /// Synchronous path: the artifact came back inline with the submission
    /// response, as may occur for image generation. No polling happens.
    Inline { artifact: ArtifactRef },
}

/// One raw status report from the poll endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Raw status string. Anything not recognized as terminal is treated as
    /// in-progress.
    pub status: String,

    /// Direct media reference from the first generation entry, if any.
    pub media_url: Option<String>,

    /// Secondary content reference from the first generation entry, if any.
    pub content_url: Option<String>,

    /// Inline base64 payload, if the service returned one.
    pub inline_b64: Option<String>,

    /// Free-text failure description, surfaced verbatim when present.
    pub failure_reason: Option<String>,
}

impl StatusReport {
    /// First candidate artifact in priority order: direct media reference,
    /// then content reference, then inline payload.
    pub fn primary_artifact(&self) -> Option<ArtifactRef> {
        if let Some(url) = &self.media_url {
            return Some(ArtifactRef::Media(url.clone()));
        }
        if let Some(url) = &self.content_url {
            return Some(ArtifactRef::Content(url.clone()));
        }
        self.inline_b64.clone().map(ArtifactRef::Inline)
    }
}

/// How a resolved URL expects the consumer to present credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMode {
    /// Public absolute URL, loadable as-is.
    Direct,

    /// Backend URL; the consumer attaches the bearer credential as an
    /// `Authorization` header.
    AuthHeader,

    /// Credential embedded as a `token` query parameter, for consumers that
    /// cannot attach custom headers (native media elements).
    TokenQuery,

    /// Credentialed-request mode (cookies / CORS credentials), the last
    /// variant before playback is declared unavailable.
    Credentialed,

    /// Self-contained data URL; nothing further to negotiate.
    DataUrl,
}
