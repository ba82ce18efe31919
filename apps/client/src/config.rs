//! Client configuration.

use std::time::Duration;

use memora_core::DecayPolicy;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_REVIEW_BATCH_SIZE: u32 = 20;

/// How to reach the sync server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_URL)
    }
}

impl ClientConfig {
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into().trim_end_matches('/').to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Read `MEMORA_BACKEND_URL`, keeping the default timeouts.
    pub fn from_env() -> Self {
        std::env::var("MEMORA_BACKEND_URL")
            .map(Self::new)
            .unwrap_or_default()
    }
}

/// Study settings persisted in the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Hour (0-23) at which a new study day starts.
    pub daily_reset_hour: u32,
    pub review_batch_size: u32,
    pub decay_policy: DecayPolicy,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            daily_reset_hour: 0,
            review_batch_size: DEFAULT_REVIEW_BATCH_SIZE,
            decay_policy: DecayPolicy::default(),
        }
    }
}
