use serde::{Deserialize, Serialize};

/// Configuration for read connection pooling
///
/// When enabled, the store keeps a pool of read-only SQLite connections, each
/// with the vec0 module registered, so KNN scans can run concurrently with a
/// writer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadPoolConfig {
    /// Whether pooling is enabled (default: false, opt-in)
    #[serde(default)]
    pub enabled: bool,

    /// Number of read-only connections in the pool (default: 4)
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Timeout in milliseconds when acquiring a pooled connection (default: 5000)
    ///
    /// If no connection is available within this time, an error is returned.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,
}

impl Default for ReadPoolConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pool_size: default_pool_size(),
            acquire_timeout_ms: default_acquire_timeout(),
        }
    }
}

impl ReadPoolConfig {
    /// Create a new enabled read pool configuration
    pub fn enabled(pool_size: usize) -> Self {
        Self {
            enabled: true,
            pool_size,
            acquire_timeout_ms: default_acquire_timeout(),
        }
    }

    /// Set the acquire timeout
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }
}

fn default_pool_size() -> usize {
    4
}

fn default_acquire_timeout() -> u64 {
    5000
}
