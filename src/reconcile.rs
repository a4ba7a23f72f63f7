//! Periodic reconciliation of calls against the remote authority
//!
//! Push delivery can miss call transitions, so every interval the monitor
//! pulls the last day of calls, diffs them against the cache and emits one
//! event per detected change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::types::RawCall;
use crate::api::{CallQuery, RemoteApi};
use crate::cache::{EntityCache, SharedCache};
use crate::error::{Error, Result};
use crate::events::{EventEmitter, SyncEvent};
use crate::models::Call;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound for the batch fetch, independent of the client default.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Trailing window of calls fetched on each tick.
pub const WINDOW_DAYS: i64 = 1;

/// Query covering the trailing reconciliation window.
pub fn window_query() -> CallQuery {
    let to = Utc::now();
    CallQuery::Range {
        from: to - chrono::Duration::days(WINDOW_DAYS),
        to,
    }
}

/// Find a call in the cache, falling back to a remote lookup by id.
///
/// When the remote returns several matches the first one wins. Remote
/// results are resolved but not inserted; reconciliation owns insertion.
pub async fn lookup_call(
    cache: &SharedCache,
    api: &dyn RemoteApi,
    call_id: i64,
) -> Result<Arc<Call>> {
    let cached = cache.lock().await.call(call_id);
    if let Some(call) = cached {
        return Ok(call);
    }

    tracing::debug!("Call {} not cached, fetching", call_id);
    let raw = api
        .fetch_calls(CallQuery::ById(call_id), None)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::unresolved("call", call_id))?;

    let call = cache.lock().await.resolve_call(&raw)?;
    Ok(Arc::new(call))
}

/// Diff a fetched batch against the cache, apply it and return the events.
///
/// Calls that fail to resolve are logged and skipped. Cached calls missing
/// from the batch are left alone.
pub fn reconcile_batch(cache: &mut EntityCache, batch: Vec<RawCall>) -> Vec<SyncEvent> {
    let mut events = Vec::new();

    for raw in batch {
        let updated = match cache.resolve_call(&raw) {
            Ok(call) => Arc::new(call),
            Err(e) => {
                tracing::error!("Skipping call {}: {}", raw.id_chamado, e);
                continue;
            }
        };

        match cache.upsert_call(Arc::clone(&updated)) {
            Some(previous) => {
                if previous.agent_id() != updated.agent_id() {
                    events.push(SyncEvent::CallAgentChanged {
                        previous: Arc::clone(&previous),
                        updated: Arc::clone(&updated),
                    });
                }
                if previous.department_id() != updated.department_id() {
                    events.push(SyncEvent::CallDepartmentChanged {
                        previous: Arc::clone(&previous),
                        updated: Arc::clone(&updated),
                    });
                }
                if previous.status != updated.status {
                    events.push(SyncEvent::CallStatusChanged {
                        previous,
                        updated,
                    });
                }
            }
            None => events.push(SyncEvent::NewCall(updated)),
        }
    }

    events
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous tick was still running.
    Skipped,
    /// The batch fetch failed; nothing changed.
    Failed,
    Completed { events: usize },
}

/// Clears the in-flight flag when a tick ends or is cancelled.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ReconciliationMonitor {
    cache: SharedCache,
    api: Arc<dyn RemoteApi>,
    emitter: EventEmitter,
    interval: Duration,
    in_flight: AtomicBool,
}

impl ReconciliationMonitor {
    pub fn new(
        cache: SharedCache,
        api: Arc<dyn RemoteApi>,
        emitter: EventEmitter,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            api,
            emitter,
            interval,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one reconciliation pass unless another is in flight.
    pub async fn tick(&self) -> TickOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Reconciliation still running, skipping tick");
            return TickOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        let batch = match self.api.fetch_calls(window_query(), Some(FETCH_TIMEOUT)).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!("Reconciliation fetch failed: {}", e);
                return TickOutcome::Failed;
            }
        };
        tracing::debug!("Reconciling {} calls", batch.len());

        let events = {
            let mut cache = self.cache.lock().await;
            reconcile_batch(&mut cache, batch)
        };
        let count = events.len();
        for event in events {
            self.emitter.emit(event);
        }
        TickOutcome::Completed { events: count }
    }

    /// Tick every interval until cancelled. Each tick runs in its own task so
    /// a slow fetch never delays the timer; overlapping ticks are dropped.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("Reconciliation every {:?}", self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let monitor = Arc::clone(&self);
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = monitor.tick() => {}
                            _ = cancel.cancelled() => {}
                        }
                    });
                }
            }
        }
        tracing::info!("Reconciliation stopped");
    }
}
