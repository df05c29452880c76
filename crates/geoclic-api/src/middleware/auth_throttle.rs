//! # Authentication Failure Throttle
//!
//! Sliding-window counter of failed authentication attempts, keyed by the
//! principal the token claims to be. Once a key reaches the configured
//! number of failures inside the window, further attempts are refused with
//! 429 until old failures age out. A successful authentication clears the
//! key.
//!
//! Keys are truncated to [`MAX_KEY_LEN`] bytes, and keys whose failures
//! have all aged out are swept at most once per window, so memory stays
//! proportional to the failures seen in the last two windows.
//!
//! State is per process. Deployments running several instances would need
//! a shared store with TTLs to get a global limit.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Longest key tracked; longer claimed principals share the truncated key.
pub const MAX_KEY_LEN: usize = 64;

/// Throttle configuration.
#[derive(Debug, Clone, Copy)]
pub struct AuthThrottleConfig {
    /// Failures tolerated inside one window.
    pub max_failures: usize,
    /// Window length.
    pub window: Duration,
}

impl Default for AuthThrottleConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default)]
struct Failures {
    by_key: HashMap<String, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

impl Failures {
    /// Drop every key with no failure inside the window.
    fn sweep(&mut self, now: Instant, length: Duration) {
        if self
            .last_sweep
            .is_some_and(|t| now.saturating_duration_since(t) < length)
        {
            return;
        }
        self.by_key.retain(|_, window| {
            prune(window, now, length);
            !window.is_empty()
        });
        self.last_sweep = Some(now);
    }
}

/// Shared throttle state, installed as a request extension.
#[derive(Debug, Clone)]
pub struct AuthThrottle {
    config: AuthThrottleConfig,
    failures: Arc<Mutex<Failures>>,
}

impl AuthThrottle {
    pub fn new(config: AuthThrottleConfig) -> Self {
        Self {
            config,
            failures: Arc::new(Mutex::new(Failures::default())),
        }
    }

    pub fn config(&self) -> AuthThrottleConfig {
        self.config
    }

    /// Whether `key` has used up its failures for the current window.
    pub fn is_blocked(&self, key: &str) -> bool {
        self.is_blocked_at(key, Instant::now())
    }

    /// Record one failed attempt for `key`.
    pub fn record_failure(&self, key: &str) {
        self.record_failure_at(key, Instant::now());
    }

    /// Forget every failure recorded for `key`.
    pub fn clear(&self, key: &str) {
        self.failures.lock().by_key.remove(bounded(key));
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.failures.lock().by_key.len()
    }

    fn is_blocked_at(&self, key: &str, now: Instant) -> bool {
        let key = bounded(key);
        let mut failures = self.failures.lock();
        let Some(window) = failures.by_key.get_mut(key) else {
            return false;
        };
        prune(window, now, self.config.window);
        if window.is_empty() {
            failures.by_key.remove(key);
            return false;
        }
        window.len() >= self.config.max_failures
    }

    fn record_failure_at(&self, key: &str, now: Instant) {
        let mut failures = self.failures.lock();
        failures.sweep(now, self.config.window);
        let window = failures.by_key.entry(bounded(key).to_string()).or_default();
        prune(window, now, self.config.window);
        window.push_back(now);
    }
}

/// `key` cut to at most [`MAX_KEY_LEN`] bytes on a character boundary.
fn bounded(key: &str) -> &str {
    if key.len() <= MAX_KEY_LEN {
        return key;
    }
    let mut end = MAX_KEY_LEN;
    while !key.is_char_boundary(end) {
        end -= 1;
    }
    &key[..end]
}

impl Default for AuthThrottle {
    fn default() -> Self {
        Self::new(AuthThrottleConfig::default())
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, length: Duration) {
    while window
        .front()
        .is_some_and(|t| now.saturating_duration_since(*t) >= length)
    {
        window.pop_front();
    }
}
