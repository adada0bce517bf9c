use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Base URL of the generation service (e.g., "https://api.example.com").
    pub api_base_url: String,

    /// Bearer credential for the generation service. Treated as opaque.
    pub api_token: String,

    /// Poll interval before the first tick completes, in seconds.
    #[serde(default = "default_poll_initial_secs")]
    pub poll_initial_secs: u64,

    /// Poll interval after the first tick, in seconds.
    #[serde(default = "default_poll_steady_secs")]
    pub poll_steady_secs: u64,

    /// Poll interval once a job has been in flight past the late threshold,
    /// in seconds.
    #[serde(default = "default_poll_late_secs")]
    pub poll_late_secs: u64,

    /// Elapsed time after which the late poll interval applies, in seconds.
    #[serde(default = "default_poll_late_after_secs")]
    pub poll_late_after_secs: u64,

    /// Base delay for rate-limit recovery, in seconds. Doubles per retry.
    #[serde(default = "default_rate_limit_base_secs")]
    pub rate_limit_base_secs: u64,

    /// Consecutive rate-limit retries allowed before a job is failed.
    #[serde(default = "default_rate_limit_max_retries")]
    pub rate_limit_max_retries: u32,
}

fn default_poll_initial_secs() -> u64 {
    10
}

fn default_poll_steady_secs() -> u64 {
    15
}

fn default_poll_late_secs() -> u64 {
    20
}

fn default_poll_late_after_secs() -> u64 {
    120
}

fn default_rate_limit_base_secs() -> u64 {
    5
}

fn default_rate_limit_max_retries() -> u32 {
    3
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("MEDIAGEN_").from_env()
    }

    /// Construct programmatically with default tuning.
    pub fn new(api_base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            api_token: api_token.into(),
            poll_initial_secs: default_poll_initial_secs(),
            poll_steady_secs: default_poll_steady_secs(),
            poll_late_secs: default_poll_late_secs(),
            poll_late_after_secs: default_poll_late_after_secs(),
            rate_limit_base_secs: default_rate_limit_base_secs(),
            rate_limit_max_retries: default_rate_limit_max_retries(),
        }
    }

    pub fn poll_initial(&self) -> Duration {
        Duration::from_secs(self.poll_initial_secs)
    }

    pub fn poll_steady(&self) -> Duration {
        Duration::from_secs(self.poll_steady_secs)
    }

    pub fn poll_late(&self) -> Duration {
        Duration::from_secs(self.poll_late_secs)
    }

    pub fn poll_late_after(&self) -> Duration {
        Duration::from_secs(self.poll_late_after_secs)
    }

    pub fn rate_limit_base(&self) -> Duration {
        Duration::from_secs(self.rate_limit_base_secs)
    }
}
