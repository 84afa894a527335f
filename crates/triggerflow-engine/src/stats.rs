//! Workspace counters.
//!
//! A silently terminated processor or a dropped event is otherwise only
//! visible in logs, so every such outcome also bumps a counter here.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct WorkspaceStats {
    events_dispatched: AtomicU64,
    routing_misses: AtomicU64,
    cache_refreshes: AtomicU64,
    events_dropped: AtomicU64,
    deliveries_to_terminated: AtomicU64,
    triggers_fired: AtomicU64,
    processors_failed: AtomicU64,
    checkpoints_written: AtomicU64,
    checkpoint_failures: AtomicU64,
    source_commits: AtomicU64,
}

/// Point-in-time copy of [`WorkspaceStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub events_dispatched: u64,
    pub routing_misses: u64,
    pub cache_refreshes: u64,
    pub events_dropped: u64,
    pub deliveries_to_terminated: u64,
    pub triggers_fired: u64,
    pub processors_failed: u64,
    pub checkpoints_written: u64,
    pub checkpoint_failures: u64,
    pub source_commits: u64,
}

macro_rules! counters {
    ($($field:ident => $incr:ident),* $(,)?) => {
        impl WorkspaceStats {
            $(
                pub(crate) fn $incr(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*

            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters! {
    events_dispatched => record_dispatch,
    routing_misses => record_miss,
    cache_refreshes => record_refresh,
    events_dropped => record_drop,
    deliveries_to_terminated => record_dead_delivery,
    triggers_fired => record_fire,
    processors_failed => record_processor_failure,
    checkpoints_written => record_checkpoint,
    checkpoint_failures => record_checkpoint_failure,
    source_commits => record_commit,
}
