//! Task lifecycle (§4.6.4), grounded on
//! `examples/original_source/app/services/link_check_service.py`'s
//! `_task_status` map and `run_link_check_task`.
//!
//! The Python original has no cancellation mechanism at all; spec.md §4.6.4
//! and §8 scenario 6 require an `interrupted` status reachable via
//! cooperative cancellation, so the task loop here is a required redesign
//! built against `tokio_util::sync::CancellationToken` — the same
//! cancellation primitive the teacher's `Component`/`telegram.rs` already
//! uses for shutdown (SPEC_FULL.md §4.6 supplement).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{LinkCheckDetails, LinkCheckStats, ProviderTally, TaskStatus};
use crate::error::AppError;
use crate::store::Store;

use super::circuit::CircuitBreaker;
use super::limits::{
    effective_concurrency, MAX_CONCURRENT_FULL_HISTORY, MAX_CONCURRENT_GLOBAL, MAX_URLS_PER_TASK,
};
use super::prober::{is_retryable, Prober, ProbeOutcome, REASON_PROVIDER_LIMITED};

pub type TaskId = String;

/// Snapshot of a running or finished task, queryable by id while in memory
/// (§4.6.4: "Task status is queryable by id while in memory").
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    pub total_links: i64,
    pub completed: i64,
    pub valid: i64,
    pub invalid: i64,
    pub failure_reason: Option<String>,
}

/// Process-scoped singleton in-memory task table (spec.md §9 "Global
/// mutable state"). The authoritative record after a task finishes is its
/// `LinkCheckStats` row in the store; this registry exists only to answer
/// "is it still running" queries and to carry the cancellation handle.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, TaskSnapshot>>,
    cancel_tokens: Mutex<HashMap<TaskId, CancellationToken>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.tasks.lock().await.get(task_id).cloned()
    }

    /// Request cancellation of a running task. No-op if the task id is
    /// unknown or already finished.
    pub async fn cancel(&self, task_id: &str) {
        if let Some(token) = self.cancel_tokens.lock().await.get(task_id) {
            token.cancel();
        }
    }

    async fn set(&self, task_id: &str, snapshot: TaskSnapshot) {
        self.tasks.lock().await.insert(task_id.to_string(), snapshot);
    }
}

struct FlatUrl {
    provider: String,
    url: String,
}

/// Run a validation task for `period` under the caller-allocated `task_id`,
/// probing every URL attached to messages whose origin falls in the
/// resolved window. The probe loop runs to completion (or interruption)
/// before this function returns — callers wanting a fire-and-forget task
/// should spawn it and hand the same `task_id` to the registry up front.
pub async fn run_validation_task(
    task_id: TaskId,
    store: &Store,
    registry: &Arc<TaskRegistry>,
    breaker: &Arc<CircuitBreaker>,
    prober: &Arc<Prober>,
    period: &str,
    requested_max_concurrent: usize,
    full_history: bool,
    cancel: CancellationToken,
) -> Result<TaskId, AppError> {
    let now = crate::time::now_local();
    let window = crate::time::parse_period(period, now)?;

    let filter = crate::store::messages::MessageFilter {
        page: 1,
        page_size: 200,
        ..Default::default()
    };
    let mut urls: Vec<FlatUrl> = Vec::new();
    let mut message_ids: std::collections::HashSet<i64> = std::collections::HashSet::new();
    let mut page = filter.clone();
    loop {
        let batch = store.get_filtered_messages(&page)?;
        for message in &batch.messages {
            if message.timestamp < window.start || message.timestamp >= window.end {
                continue;
            }
            message_ids.insert(message.id);
            for (provider, entries) in &message.links {
                for entry in entries {
                    urls.push(FlatUrl { provider: provider.clone(), url: entry.url.clone() });
                }
            }
        }
        if batch.messages.len() < page.page_size as usize {
            break;
        }
        page.page += 1;
    }

    if urls.len() > MAX_URLS_PER_TASK {
        warn!(%task_id, url_count = urls.len(), "validation task exceeds safety cap");
        registry
            .set(
                &task_id,
                TaskSnapshot {
                    status: TaskStatus::Failed,
                    total_links: urls.len() as i64,
                    completed: 0,
                    valid: 0,
                    invalid: 0,
                    failure_reason: Some(super::limits::SAFETY_CAP_URL_COUNT.to_string()),
                },
            )
            .await;
        return Ok(task_id);
    }

    let max_concurrent = if full_history {
        requested_max_concurrent.min(MAX_CONCURRENT_FULL_HISTORY)
    } else {
        requested_max_concurrent
    };

    registry
        .set(
            &task_id,
            TaskSnapshot {
                status: TaskStatus::Running,
                total_links: urls.len() as i64,
                completed: 0,
                valid: 0,
                invalid: 0,
                failure_reason: None,
            },
        )
        .await;
    registry.cancel_tokens.lock().await.insert(task_id.clone(), cancel.clone());

    info!(%task_id, url_count = urls.len(), "validation task started");

    let outcome = probe_all(&urls, max_concurrent, breaker, prober, &cancel).await;

    let total_messages = message_ids.len() as i64;
    let total_links = urls.len() as i64;
    let valid_links = outcome.details.iter().filter(|d| d.is_valid).count() as i64;
    let invalid_links = total_links - valid_links;
    let status = if outcome.interrupted { TaskStatus::Interrupted } else { TaskStatus::Completed };

    let mut netdisk_stats: BTreeMap<String, ProviderTally> = BTreeMap::new();
    for detail in &outcome.details {
        let tally = netdisk_stats.entry(detail.netdisk_type.clone()).or_default();
        tally.total += 1;
        if detail.is_valid {
            tally.valid += 1;
        } else {
            tally.invalid += 1;
        }
    }

    let stats = LinkCheckStats {
        id: 0,
        check_time: now,
        total_messages,
        total_links,
        valid_links,
        invalid_links,
        deleted_messages: 0,
        updated_messages: 0,
        netdisk_stats,
        check_duration: outcome.duration.as_secs_f64(),
        status,
        created_at: now,
    };

    store.record_link_check(&stats, &outcome.details)?;

    registry
        .set(
            &task_id,
            TaskSnapshot {
                status,
                total_links,
                completed: outcome.details.len() as i64,
                valid: valid_links,
                invalid: invalid_links,
                failure_reason: None,
            },
        )
        .await;
    registry.cancel_tokens.lock().await.remove(&task_id);

    info!(%task_id, %status, "validation task finished");
    Ok(task_id)
}

struct ProbeRoundOutcome {
    details: Vec<LinkCheckDetails>,
    interrupted: bool,
    duration: std::time::Duration,
}

async fn probe_all(
    urls: &[FlatUrl],
    max_concurrent: usize,
    breaker: &Arc<CircuitBreaker>,
    prober: &Arc<Prober>,
    cancel: &CancellationToken,
) -> ProbeRoundOutcome {
    let started = std::time::Instant::now();
    let global_semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_GLOBAL));
    let mut provider_semaphores: HashMap<String, Arc<Semaphore>> = HashMap::new();
    for url in urls {
        provider_semaphores
            .entry(url.provider.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(effective_concurrency(&url.provider, max_concurrent))));
    }

    let mut join_set = tokio::task::JoinSet::new();
    let mut interrupted = false;

    for (index, url) in urls.iter().enumerate() {
        if cancel.is_cancelled() {
            interrupted = true;
            break;
        }

        let provider = url.provider.clone();
        let target = url.url.clone();
        let global = global_semaphore.clone();
        let per_provider = provider_semaphores.get(&provider).unwrap().clone();
        let breaker = breaker.clone();
        let prober = prober.clone();
        let cancel = cancel.clone();
        let now = crate::time::now_local();

        join_set.spawn(async move {
            if breaker.is_tripped(&provider) {
                return LinkCheckDetails {
                    id: 0,
                    check_time: now,
                    message_id: 0,
                    netdisk_type: provider,
                    url: target,
                    is_valid: false,
                    response_time: None,
                    error_reason: Some(REASON_PROVIDER_LIMITED.to_string()),
                    action_taken: "none".to_string(),
                    created_at: now,
                };
            }

            let _global_permit = global.acquire_owned().await.ok();
            let _provider_permit = per_provider.acquire_owned().await.ok();

            let mut rng = rand::thread_rng();
            let delay = super::limits::sample_delay(&provider, &mut rng);
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }

            let mut outcome = prober.probe(&target, &provider).await;
            outcome = retry_if_needed(&outcome, &target, &provider, &prober, &cancel).await;

            if outcome.is_valid {
                breaker.record_success(&provider);
            } else {
                breaker.record_error(&provider);
            }

            debug!(%provider, url = %target, is_valid = outcome.is_valid, "probe complete");

            LinkCheckDetails {
                id: 0,
                check_time: now,
                message_id: 0,
                netdisk_type: provider,
                url: target,
                is_valid: outcome.is_valid,
                response_time: outcome.response_time,
                error_reason: outcome.reason.map(str::to_string),
                action_taken: "none".to_string(),
                created_at: now,
            }
        });

        // Safety valve against unbounded join-set growth; not itself a
        // concurrency limiter (that's the semaphores above).
        if index % 64 == 0 {
            tokio::task::yield_now().await;
        }
    }

    let mut details = Vec::with_capacity(urls.len());
    while let Some(result) = join_set.join_next().await {
        if let Ok(detail) = result {
            details.push(detail);
        }
    }

    ProbeRoundOutcome { details, interrupted, duration: started.elapsed() }
}

/// One retry pass (§4.6.3): up to 3 attempts, 2s pause, stopping early on
/// success or a terminal outcome.
async fn retry_if_needed(
    first: &ProbeOutcome,
    url: &str,
    provider: &str,
    prober: &Arc<Prober>,
    cancel: &CancellationToken,
) -> ProbeOutcome {
    let Some(reason) = first.reason else { return first.clone() };
    if !is_retryable(reason) {
        return first.clone();
    }

    let mut current = first.clone();
    for _ in 0..3 {
        if cancel.is_cancelled() {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {}
        }
        current = prober.probe(url, provider).await;
        match current.reason {
            None => break,
            Some(r) if !is_retryable(r) => break,
            _ => continue,
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::prober::ProbeOutcome;

    fn outcome(is_valid: bool, reason: Option<&'static str>) -> ProbeOutcome {
        ProbeOutcome { is_valid, status_code: Some(200), response_time: Some(0.01), reason }
    }

    #[tokio::test]
    async fn terminal_reason_is_not_retried() {
        let prober = Arc::new(Prober::Stub(|_, _| outcome(false, Some(super::super::prober::REASON_FORMAT_ERROR))));
        let cancel = CancellationToken::new();
        let first = outcome(false, Some(super::super::prober::REASON_FORMAT_ERROR));
        let result = retry_if_needed(&first, "https://x", "夸克网盘", &prober, &cancel).await;
        assert_eq!(result, first);
    }

    #[tokio::test]
    async fn task_registry_reports_snapshot_after_set() {
        let registry = TaskRegistry::new();
        registry
            .set(
                "t1",
                TaskSnapshot { status: TaskStatus::Running, total_links: 5, completed: 0, valid: 0, invalid: 0, failure_reason: None },
            )
            .await;
        let snap = registry.snapshot("t1").await.unwrap();
        assert_eq!(snap.total_links, 5);
    }

    #[tokio::test]
    async fn unknown_task_cancel_is_a_noop() {
        let registry = TaskRegistry::new();
        registry.cancel("does-not-exist").await;
    }
}
