//! Configuration for the domain resolver.

use std::time::Duration;

/// Default location below which domains must live.
pub const DEFAULT_DOMAIN_LOCATION: &str = "/hippo:configuration/hippo:domains";

/// Configuration for the domain resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Time-to-live of a resolved domain set.
    ///
    /// Structural configuration changes invalidate eagerly, so this only
    /// bounds how long an unused principal tuple is kept.
    pub ttl: Duration,
    /// Maximum number of cached principal tuples.
    pub max_capacity: u64,
    /// Configuration paths domains must live below.
    pub domain_locations: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            max_capacity: 10_000,
            domain_locations: vec![DEFAULT_DOMAIN_LOCATION.to_string()],
        }
    }
}

impl ResolverConfig {
    /// Sets the time-to-live of cached resolutions.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the maximum number of cached principal tuples.
    pub fn with_max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Replaces the allowed domain locations.
    pub fn with_domain_locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domain_locations = locations.into_iter().map(Into::into).collect();
        self
    }
}
