use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection-pool and timeout settings for outbound tool calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    /// Maximum number of requests in flight at once.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// How long a call may wait for a free connection slot before failing.
    ///
    /// `0` fails immediately when the pool is exhausted.
    #[serde(default = "default_pending_acquire_timeout_secs")]
    pub pending_acquire_timeout_secs: u64,

    /// Upper bound for a single request, from send until the full body is read.
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,

    /// TCP/TLS connect timeout.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> usize {
    100
}

fn default_pending_acquire_timeout_secs() -> u64 {
    30
}

fn default_response_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            pending_acquire_timeout_secs: default_pending_acquire_timeout_secs(),
            response_timeout_secs: default_response_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub fn pending_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_acquire_timeout_secs)
    }

    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
