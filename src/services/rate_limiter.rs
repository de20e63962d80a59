use dashmap::DashMap;
use std::collections::VecDeque;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Sliding-window request limiter keyed by client (usually the remote IP).
///
/// The number of tracked keys is bounded. Keys whose window has fully expired
/// are evicted on access when the map is full and by [`RateLimiter::cleanup`].
pub struct RateLimiter<K: Eq + Hash + Clone> {
    hits: DashMap<K, VecDeque<Instant>>,
    limit: usize,
    window: Duration,
    max_keys: usize,
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: usize },
    Limited { retry_after: Duration },
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    /// Allow `limit` requests per `window` for at most `max_keys` clients.
    pub fn new(limit: usize, window: Duration, max_keys: usize) -> Self {
        Self {
            hits: DashMap::new(),
            limit: limit.max(1),
            window,
            max_keys: max_keys.max(1),
        }
    }

    /// Requests per minute, tracking up to 10k clients.
    pub fn per_minute(limit: usize) -> Self {
        Self::new(limit, Duration::from_secs(60), 10_000)
    }

    /// Record a request for `key` if it is within its allowance.
    pub fn check(&self, key: &K) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &K, now: Instant) -> RateDecision {
        if !self.hits.contains_key(key) && self.hits.len() >= self.max_keys {
            self.evict_expired(now);
            if self.hits.len() >= self.max_keys {
                return RateDecision::Limited {
                    retry_after: self.window,
                };
            }
        }

        let mut entry = self.hits.entry(key.clone()).or_default();
        let times = entry.value_mut();
        while times
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            times.pop_front();
        }

        if times.len() >= self.limit {
            let oldest = times.front().copied().unwrap_or(now);
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            return RateDecision::Limited { retry_after };
        }

        times.push_back(now);
        RateDecision::Allowed {
            remaining: self.limit - times.len(),
        }
    }

    fn evict_expired(&self, now: Instant) {
        self.hits.retain(|_, times| {
            times
                .back()
                .is_some_and(|t| now.duration_since(*t) < self.window)
        });
    }

    /// Remove keys with no requests inside the window.
    pub fn cleanup(&self) {
        self.evict_expired(Instant::now());
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}
