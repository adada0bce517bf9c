use std::sync::Arc;

use base64::Engine;
use url::Url;

use crate::credentials::CredentialProvider;
use crate::models::job::JobKind;
use crate::models::report::{ArtifactRef, ResolveMode};

/// A URL the consumer can hand to its renderer, plus the credential mode it
/// was resolved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub url: String,
    pub mode: ResolveMode,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("the generation succeeded but the report carried no artifact reference")]
    MissingArtifact,

    #[error("the generation succeeded but no URL variant was accepted for playback")]
    PlaybackUnavailable,

    #[error("artifact reference could not be resolved: {0}")]
    Unresolvable(String),
}

/// One way of turning an artifact reference into a loadable URL.
///
/// Strategies are tried in order and the first that applies wins, so a
/// non-browser embedding can install a single trivial strategy in place of
/// the default ladder.
pub trait ResolveStrategy: Send + Sync {
    /// Resolve the artifact, or `None` if this strategy does not apply.
    fn resolve(&self, artifact: &ArtifactRef, kind: JobKind) -> Option<ResolvedMedia>;

    /// Produce the next URL variant after the consumer rejected `current`
    /// at render time. `None` when this strategy has no further variant.
    fn fallback(&self, artifact: &ArtifactRef, current: &ResolvedMedia) -> Option<ResolvedMedia> {
        let _ = (artifact, current);
        None
    }
}

fn artifact_url(artifact: &ArtifactRef) -> Option<&str> {
    match artifact {
        ArtifactRef::Media(url) | ArtifactRef::Content(url) => Some(url),
        ArtifactRef::Inline(_) => None,
    }
}

fn is_absolute_http(reference: &str) -> bool {
    match Url::parse(reference) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

fn with_token_query(url: &str, credentials: &dyn CredentialProvider) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs_mut()
        .append_pair("token", &credentials.bearer_token());
    Some(parsed.into())
}

/// Passes public absolute URLs through untouched.
pub struct DirectUrlStrategy {
    credentials: Arc<dyn CredentialProvider>,
}

impl DirectUrlStrategy {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self { credentials }
    }
}

impl ResolveStrategy for DirectUrlStrategy {
    fn resolve(&self, artifact: &ArtifactRef, _kind: JobKind) -> Option<ResolvedMedia> {
        let reference = artifact_url(artifact)?;
        if !is_absolute_http(reference) {
            return None;
        }
        Some(ResolvedMedia {
            url: reference.to_string(),
            mode: ResolveMode::Direct,
        })
    }

    fn fallback(&self, artifact: &ArtifactRef, current: &ResolvedMedia) -> Option<ResolvedMedia> {
        let reference = artifact_url(artifact)?;
        if !is_absolute_http(reference) {
            return None;
        }
        match current.mode {
            ResolveMode::Direct => Some(ResolvedMedia {
                url: with_token_query(reference, self.credentials.as_ref())?,
                mode: ResolveMode::TokenQuery,
            }),
            ResolveMode::TokenQuery => Some(ResolvedMedia {
                url: reference.to_string(),
                mode: ResolveMode::Credentialed,
            }),
            _ => None,
        }
    }
}

/// Resolves backend-relative paths against the deployment's base URL. The
/// initial variant expects the consumer to attach the bearer credential as
/// an `Authorization` header; the fallback variants embed it as a `token`
/// query parameter and finally switch to credentialed-request mode.
pub struct BackendPathStrategy {
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl BackendPathStrategy {
    pub fn new(
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ResolveError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ResolveError::Unresolvable(format!("invalid base URL: {e}")))?;
        Ok(Self {
            base_url,
            credentials,
        })
    }

    fn absolute(&self, reference: &str) -> Option<Url> {
        if is_absolute_http(reference) {
            return None;
        }
        self.base_url.join(reference).ok()
    }
}

impl ResolveStrategy for BackendPathStrategy {
    fn resolve(&self, artifact: &ArtifactRef, _kind: JobKind) -> Option<ResolvedMedia> {
        let reference = artifact_url(artifact)?;
        let absolute = self.absolute(reference)?;
        Some(ResolvedMedia {
            url: absolute.into(),
            mode: ResolveMode::AuthHeader,
        })
    }

    fn fallback(&self, artifact: &ArtifactRef, current: &ResolvedMedia) -> Option<ResolvedMedia> {
        let reference = artifact_url(artifact)?;
        let absolute = self.absolute(reference)?;
        match current.mode {
            ResolveMode::AuthHeader => Some(ResolvedMedia {
                url: with_token_query(absolute.as_str(), self.credentials.as_ref())?,
                mode: ResolveMode::TokenQuery,
            }),
            ResolveMode::TokenQuery => Some(ResolvedMedia {
                url: absolute.into(),
                mode: ResolveMode::Credentialed,
            }),
            _ => None,
        }
    }
}

/// Wraps inline base64 payloads as self-contained data URLs.
pub struct InlineDataStrategy;

impl ResolveStrategy for InlineDataStrategy {
    fn resolve(&self, artifact: &ArtifactRef, kind: JobKind) -> Option<ResolvedMedia> {
        let ArtifactRef::Inline(b64) = artifact else {
            return None;
        };
        // Reject payloads that are not actually base64 before handing the
        // consumer a data URL it cannot decode.
        base64::engine::general_purpose::STANDARD.decode(b64).ok()?;
        let mime = match kind {
            JobKind::Image => "image/png",
            JobKind::Video => "video/mp4",
        };
        Some(ResolvedMedia {
            url: format!("data:{mime};base64,{b64}"),
            mode: ResolveMode::DataUrl,
        })
    }
}

/// Ordered strategy ladder turning terminal artifact references into URLs
/// the consumer can load.
pub struct ResultResolver {
    strategies: Vec<Arc<dyn ResolveStrategy>>,
}

impl ResultResolver {
    pub fn new(strategies: Vec<Arc<dyn ResolveStrategy>>) -> Self {
        Self { strategies }
    }

    /// The default ladder: public URLs pass through, backend paths are
    /// resolved against `base_url` with the caller's credential, inline
    /// payloads become data URLs.
    pub fn for_service(
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ResolveError> {
        Ok(Self::new(vec![
            Arc::new(DirectUrlStrategy::new(credentials.clone())),
            Arc::new(BackendPathStrategy::new(base_url, credentials)?),
            Arc::new(InlineDataStrategy),
        ]))
    }

    pub fn resolve(
        &self,
        artifact: Option<&ArtifactRef>,
        kind: JobKind,
    ) -> Result<ResolvedMedia, ResolveError> {
        let artifact = artifact.ok_or(ResolveError::MissingArtifact)?;
        for strategy in &self.strategies {
            if let Some(resolved) = strategy.resolve(artifact, kind) {
                return Ok(resolved);
            }
        }
        Err(ResolveError::Unresolvable(describe(artifact)))
    }

    /// Next URL variant after a render-time rejection of `current`, or
    /// `None` when every variant has been exhausted.
    pub fn fallback(&self, artifact: &ArtifactRef, current: &ResolvedMedia) -> Option<ResolvedMedia> {
        self.strategies
            .iter()
            .find_map(|s| s.fallback(artifact, current))
    }
}

fn describe(artifact: &ArtifactRef) -> String {
    match artifact {
        ArtifactRef::Media(url) => format!("media reference {url}"),
        ArtifactRef::Content(url) => format!("content reference {url}"),
        ArtifactRef::Inline(_) => "inline payload".to_string(),
    }
}
