//! Lock-free region scheduler counters.
//!
//! Region tasks bump these with relaxed atomics; readers take a
//! [`RegionStatsSnapshot`] whenever they like.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

#[derive(Default)]
pub struct RegionStats {
    sessions: AtomicU64,
    operations: AtomicU64,
    reads: AtomicU64,
    read_failures: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

impl RegionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn session_opened(&self) {
        self.sessions.fetch_add(1, Relaxed);
    }

    pub(crate) fn operation_run(&self) {
        self.operations.fetch_add(1, Relaxed);
    }

    pub(crate) fn region_read(&self, ok: bool) {
        if ok {
            self.reads.fetch_add(1, Relaxed);
        } else {
            self.read_failures.fetch_add(1, Relaxed);
        }
    }

    pub(crate) fn region_written(&self, ok: bool) {
        if ok {
            self.writes.fetch_add(1, Relaxed);
        } else {
            self.write_failures.fetch_add(1, Relaxed);
        }
    }

    pub fn snapshot(&self) -> RegionStatsSnapshot {
        RegionStatsSnapshot {
            sessions: self.sessions.load(Relaxed),
            operations: self.operations.load(Relaxed),
            reads: self.reads.load(Relaxed),
            read_failures: self.read_failures.load(Relaxed),
            writes: self.writes.load(Relaxed),
            write_failures: self.write_failures.load(Relaxed),
        }
    }
}

/// Counters at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionStatsSnapshot {
    /// Region sessions opened (a session lasts until its close-out).
    pub sessions: u64,
    /// Operations run across all sessions.
    pub operations: u64,
    /// Region files read from disk (missing files count as reads).
    pub reads: u64,
    pub read_failures: u64,
    /// Region files written or deleted on close-out.
    pub writes: u64,
    pub write_failures: u64,
}
