use time::Duration;

/// How long responses are cached when no TTL is configured.
pub const DEFAULT_CACHE_DURATION: Duration = Duration::minutes(30);

/// Configuration of a [`CachingCredentialHelper`](super::CachingCredentialHelper).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// How long a successful response is served from the cache.
    ///
    /// [`Duration::ZERO`] selects [`DEFAULT_CACHE_DURATION`]. Negative values
    /// are rejected.
    pub ttl: Duration,
}

impl CacheOptions {
    /// Options with the given TTL.
    pub const fn with_ttl(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Returns the TTL to use, or `None` if it is negative.
    pub(super) fn effective_ttl(&self) -> Option<Duration> {
        if self.ttl.is_negative() {
            None
        } else if self.ttl.is_zero() {
            Some(DEFAULT_CACHE_DURATION)
        } else {
            Some(self.ttl)
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { ttl: Duration::ZERO }
    }
}
