//! Per-provider circuit breaker (§4.6.1): a process-wide mapping of
//! consecutive probe errors, reset on success, short-circuiting further
//! probes once a provider reaches the threshold (spec.md §9 "Global mutable
//! state").

use std::collections::HashMap;
use std::sync::Mutex;

use super::limits::CIRCUIT_BREAKER_THRESHOLD;

#[derive(Debug, Default)]
pub struct CircuitBreaker {
    consecutive_errors: Mutex<HashMap<String, u32>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once `provider` has reached the threshold and further probes
    /// should be short-circuited with `REASON_PROVIDER_LIMITED`.
    pub fn is_tripped(&self, provider: &str) -> bool {
        let counts = self.consecutive_errors.lock().unwrap();
        counts.get(provider).copied().unwrap_or(0) >= CIRCUIT_BREAKER_THRESHOLD
    }

    pub fn record_error(&self, provider: &str) {
        let mut counts = self.consecutive_errors.lock().unwrap();
        *counts.entry(provider.to_string()).or_insert(0) += 1;
    }

    pub fn record_success(&self, provider: &str) {
        let mut counts = self.consecutive_errors.lock().unwrap();
        counts.insert(provider.to_string(), 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_consecutive_errors() {
        let cb = CircuitBreaker::new();
        for _ in 0..9 {
            cb.record_error("夸克网盘");
        }
        assert!(!cb.is_tripped("夸克网盘"));
        cb.record_error("夸克网盘");
        assert!(cb.is_tripped("夸克网盘"));
    }

    #[test]
    fn success_resets_the_counter() {
        let cb = CircuitBreaker::new();
        for _ in 0..9 {
            cb.record_error("夸克网盘");
        }
        cb.record_success("夸克网盘");
        cb.record_error("夸克网盘");
        assert!(!cb.is_tripped("夸克网盘"));
    }

    #[test]
    fn providers_are_tracked_independently() {
        let cb = CircuitBreaker::new();
        for _ in 0..10 {
            cb.record_error("夸克网盘");
        }
        assert!(cb.is_tripped("夸克网盘"));
        assert!(!cb.is_tripped("百度网盘"));
    }
}
