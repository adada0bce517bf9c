use std::sync::Arc;

/// Source of the opaque bearer credential attached to generation-service
/// calls. The orchestrator never inspects or refreshes the token; acquiring
/// and rotating it is the host application's concern.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> String;
}

/// Fixed token taken from configuration.
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl CredentialProvider for StaticCredential {
    fn bearer_token(&self) -> String {
        self.token.clone()
    }
}

impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    fn bearer_token(&self) -> String {
        (**self).bearer_token()
    }
}
