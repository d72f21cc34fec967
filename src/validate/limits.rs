//! Per-provider concurrency/delay table and safety caps (§4.6.1), ported
//! verbatim from `examples/original_source/link_validator.py`'s
//! `netdisk_limits` and `examples/original_source/app/services/link_check_service.py`'s
//! `check_safety_limits`.

use std::time::Duration;

use rand::Rng;

/// `(max_concurrent, delay_range_seconds)` for one provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderLimit {
    pub provider: &'static str,
    pub max_concurrent: usize,
    pub delay_range: (f64, f64),
}

pub const PROVIDER_LIMITS: &[ProviderLimit] = &[
    ProviderLimit { provider: "百度网盘", max_concurrent: 3, delay_range: (1.0, 3.0) },
    ProviderLimit { provider: "夸克网盘", max_concurrent: 5, delay_range: (0.5, 2.0) },
    ProviderLimit { provider: "阿里云盘", max_concurrent: 4, delay_range: (1.0, 2.5) },
    ProviderLimit { provider: "115网盘", max_concurrent: 2, delay_range: (2.0, 4.0) },
    ProviderLimit { provider: "天翼云盘", max_concurrent: 3, delay_range: (1.0, 3.0) },
    ProviderLimit { provider: "123云盘", max_concurrent: 3, delay_range: (1.0, 2.0) },
    ProviderLimit { provider: "UC网盘", max_concurrent: 3, delay_range: (1.0, 2.0) },
    ProviderLimit { provider: "迅雷", max_concurrent: 3, delay_range: (1.0, 2.0) },
    ProviderLimit { provider: "unknown", max_concurrent: 2, delay_range: (2.0, 4.0) },
];

pub const MAX_URLS_PER_TASK: usize = 1000;
pub const MAX_CONCURRENT_GLOBAL: usize = 10;
/// Full-history mode additionally caps `max_concurrent` at this value.
pub const MAX_CONCURRENT_FULL_HISTORY: usize = 3;
/// Consecutive-error threshold at which a provider is circuit-broken (§4.6.1).
pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 10;

/// Look up `provider`'s limit row, falling back to the `"unknown"` row.
pub fn limit_for(provider: &str) -> ProviderLimit {
    PROVIDER_LIMITS
        .iter()
        .find(|l| l.provider == provider)
        .copied()
        .unwrap_or_else(|| PROVIDER_LIMITS.iter().find(|l| l.provider == "unknown").copied().unwrap())
}

/// Effective per-provider concurrency given a task-level cap
/// (`min(table, task.max_concurrent)`, §4.6.1).
pub fn effective_concurrency(provider: &str, task_max_concurrent: usize) -> usize {
    limit_for(provider).max_concurrent.min(task_max_concurrent)
}

/// Sample a uniform random delay within `provider`'s configured range.
pub fn sample_delay(provider: &str, rng: &mut impl rand::Rng) -> Duration {
    let (lo, hi) = limit_for(provider).delay_range;
    let secs = rng.gen_range(lo..=hi);
    Duration::from_secs_f64(secs)
}

/// Reason used when a task exceeds a safety cap at submission time.
pub const SAFETY_CAP_URL_COUNT: &str = "任务链接数量超出限制";
