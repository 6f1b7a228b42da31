//! Centralized configuration for the event bus.
//!
//! An env-var-plus-builder shape: a `BusConfig` with sensible defaults, a
//! `from_env()` constructor for the handful of env vars worth tuning in
//! production, and a fluent builder for programmatic overrides (tests,
//! embedding code that already has its own config layer).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default upper bound, in bytes, on a publish call's safe payload
/// (`size_of::<S>()`). Adjustable per `BusConfig` instance; §6 calls this
/// "384 bytes, adjustable at build time" — here it's adjustable at
/// construction time instead, which is strictly more flexible.
pub const DEFAULT_ENVELOPE_CAPACITY: usize = 384;

#[derive(Clone)]
pub struct BusConfig {
    /// Upper bound on a published safe payload's `size_of`.
    /// Env: `EVBUS_ENVELOPE_CAPACITY` (default 384).
    pub envelope_capacity: usize,

    /// Test-only fault injection: when set, the *next* async envelope
    /// allocation attempt reports failure instead of enqueuing, exercising
    /// the "allocation failure" path described in §7 without requiring a
    /// genuinely fallible allocator.
    fail_next_async_alloc: Arc<AtomicBool>,

    /// Test-only fault injection: when set, the *next* subscribe attempt
    /// reports failure instead of registering a subscription, mirroring
    /// `fail_next_async_alloc` for the other allocation site §7 names.
    fail_next_subscribe_alloc: Arc<AtomicBool>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            envelope_capacity: DEFAULT_ENVELOPE_CAPACITY,
            fail_next_async_alloc: Arc::new(AtomicBool::new(false)),
            fail_next_subscribe_alloc: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl BusConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("EVBUS_ENVELOPE_CAPACITY") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.envelope_capacity = n;
            }
        }
        cfg
    }

    pub fn builder() -> BusConfigBuilder {
        BusConfigBuilder::default()
    }

    /// Test hook: arrange for the next async enqueue attempt on any
    /// sublist sharing this config to fail.
    pub fn inject_alloc_failure(&self) {
        self.fail_next_async_alloc.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_injected_alloc_failure(&self) -> bool {
        self.fail_next_async_alloc
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Test hook: arrange for the next `subscribe`/`subscribe_ptr` call on
    /// any sublist sharing this config to fail.
    pub fn inject_subscribe_failure(&self) {
        self.fail_next_subscribe_alloc.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_injected_subscribe_failure(&self) -> bool {
        self.fail_next_subscribe_alloc
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl fmt::Debug for BusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusConfig")
            .field("envelope_capacity", &self.envelope_capacity)
            .finish()
    }
}

#[derive(Default)]
pub struct BusConfigBuilder {
    cfg: BusConfig,
}

impl BusConfigBuilder {
    pub fn envelope_capacity(mut self, bytes: usize) -> Self {
        self.cfg.envelope_capacity = bytes;
        self
    }

    pub fn build(self) -> BusConfig {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_matches_spec() {
        assert_eq!(BusConfig::default().envelope_capacity, 384);
    }

    #[test]
    fn builder_overrides_capacity() {
        let cfg = BusConfig::builder().envelope_capacity(64).build();
        assert_eq!(cfg.envelope_capacity, 64);
    }

    #[test]
    fn env_override_parses_and_falls_back_on_garbage() {
        std::env::set_var("EVBUS_ENVELOPE_CAPACITY", "128");
        assert_eq!(BusConfig::from_env().envelope_capacity, 128);
        std::env::set_var("EVBUS_ENVELOPE_CAPACITY", "not-a-number");
        assert_eq!(BusConfig::from_env().envelope_capacity, DEFAULT_ENVELOPE_CAPACITY);
        std::env::remove_var("EVBUS_ENVELOPE_CAPACITY");
    }

    #[test]
    fn injected_alloc_failure_is_consumed_once() {
        let cfg = BusConfig::default();
        assert!(!cfg.take_injected_alloc_failure());
        cfg.inject_alloc_failure();
        assert!(cfg.take_injected_alloc_failure());
        assert!(!cfg.take_injected_alloc_failure());
    }

    #[test]
    fn injected_subscribe_failure_is_consumed_once_and_independent() {
        let cfg = BusConfig::default();
        assert!(!cfg.take_injected_subscribe_failure());
        cfg.inject_subscribe_failure();
        assert!(!cfg.take_injected_alloc_failure(), "subscribe flag must not trip the publish flag");
        assert!(cfg.take_injected_subscribe_failure());
        assert!(!cfg.take_injected_subscribe_failure());
    }
}
