//! Per-dataset poll task and the check it runs.

use std::sync::Arc;

use chrono::SecondsFormat;
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::DeltaEvent;
use super::DeltaSyncInner;
use super::ListenerState;
use super::merge;
use crate::api::query::Filter;
use crate::api::query::OrderBy;
use crate::api::query::Query;

/// How a check acquires the per-dataset in-flight slot.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CheckMode {
    /// Timer ticks skip when a check is already running, so fixed-period
    /// scheduling can never re-enter the merge for the same dataset.
    Tick,
    /// Out-of-band checks (force, reconnect sweep) queue behind a running
    /// check instead of silently dropping.
    Wait,
}

/// The poll loop for one dataset listener.
///
/// The first tick fires immediately; cancellation is observed between
/// checks, never mid-check, so a stop lets an in-flight merge finish.
pub(crate) async fn run(
    inner: Arc<DeltaSyncInner>,
    state: Arc<ListenerState>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(state.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        check_for_updates(&inner, &state, CheckMode::Tick).await;
    }

    debug!(dataset = %state.dataset, "listener task exited");
}

/// One incremental check: fetch records changed since `last_seen`, merge
/// them into the snapshot, advance the checkpoint, publish a notification.
pub(crate) async fn check_for_updates(
    inner: &DeltaSyncInner,
    state: &ListenerState,
    mode: CheckMode,
) {
    if !inner.connectivity.is_online() {
        debug!(dataset = %state.dataset, "offline, skipping check");
        return;
    }

    let _guard = match mode {
        CheckMode::Tick => match state.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(dataset = %state.dataset, "check already in flight, skipping tick");
                return;
            }
        },
        CheckMode::Wait => state.in_flight.lock().await,
    };

    *state.last_check.lock().await = Some(Utc::now());
    let since = *state.last_seen.lock().await;
    debug!(dataset = %state.dataset, %since, "checking for updates");

    let query = Query::new()
        .filter(Filter::gt(
            merge::CHANGE_FIELD,
            since.to_rfc3339_opts(SecondsFormat::Millis, true),
        ))
        .order_by(OrderBy::desc(merge::CHANGE_FIELD))
        .limit(state.batch_size);

    match inner.store.query(&state.collection, &query).await {
        Ok(page) => {
            if page.is_empty() {
                debug!(dataset = %state.dataset, "no updates");
                return;
            }

            let updates = page.into_records();
            info!(dataset = %state.dataset, count = updates.len(), "found updates");

            // Advance to the newest change observed, not to now, so the next
            // check resumes without a gap.
            let newest = updates.iter().filter_map(|r| r.updated_at()).max();
            let changed = merge::apply_updates(&inner.snapshots, &state.dataset, &updates).await;

            if let Some(newest) = newest {
                *state.last_seen.lock().await = newest;
            }

            if !changed.is_empty() {
                // Fire-and-forget; a send error only means nobody is listening.
                let _ = inner.events.send(DeltaEvent {
                    dataset: state.dataset.clone(),
                    changed,
                    timestamp: Utc::now(),
                });
            }
        }
        Err(err) if err.is_missing_capability() => {
            warn!(
                dataset = %state.dataset, %err,
                "incremental queries unsupported, falling back to full refresh"
            );
            inner
                .snapshots
                .force_refresh(&state.dataset, &state.collection)
                .await;
            *state.last_seen.lock().await = Utc::now();
        }
        Err(err) => {
            warn!(dataset = %state.dataset, %err, "delta check failed, will retry next tick");
        }
    }
}
