//! Per-region task chains.
//!
//! Every region has at most one [`RegionTask`] at a time. An operation
//! scheduled for a region with no task runs right away on a fresh tokio task;
//! an operation for a region that already has one is chained behind the
//! current tail and runs once it finishes. Operations for one region therefore
//! never overlap and run in submission order, while different regions proceed
//! in parallel.
//!
//! A chain shares one [`RegionBuffer`]: the region file is read once, on the
//! first operation, and later operations work against the buffered copy.
//! After each operation the task waits out the flush delay. Any new operation
//! for the region cancels that wait and takes over the chain, so a burst of
//! loads and unloads costs one read and one write. When the delay elapses
//! uncancelled the buffer is written (if dirty) and the task entry is removed.
//! A failed write keeps the session and its dirty buffer; the write is retried
//! after another flush delay, or by whichever step takes over the chain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::file::{ChunkMetadata, RegionData, RegionFiles};
use super::stats::{RegionStats, RegionStatsSnapshot};
use crate::error::StoreError;
use crate::world::position::{ChunkPos, RegionKey};

/// Default debounce window before a region session is written and closed.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_secs(2);

/// Anything that can be stored per block.
pub trait MetadataValue: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> MetadataValue for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Session copy of one region file.
pub struct RegionBuffer<T> {
    data: RegionData<T>,
    buffered: bool,
    dirty: bool,
}

impl<T> RegionBuffer<T> {
    fn new() -> Self {
        Self {
            data: RegionData::new(),
            buffered: false,
            dirty: false,
        }
    }

    /// Values stored for `chunk`, if any.
    pub fn section(&self, chunk: ChunkPos) -> Option<&ChunkMetadata<T>> {
        self.data.get(&chunk)
    }

    /// Replace the section of `chunk`. `None` or an empty map removes it.
    pub fn replace_section(&mut self, chunk: ChunkPos, values: Option<ChunkMetadata<T>>) {
        match values {
            Some(values) if !values.is_empty() => {
                self.data.insert(chunk, values);
            }
            _ => {
                self.data.shift_remove(&chunk);
            }
        }
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn chunk_count(&self) -> usize {
        self.data.len()
    }
}

struct RegionTask<T> {
    /// Last step scheduled for the region; the next step awaits it.
    tail: Option<JoinHandle<()>>,
    buffer: Arc<Mutex<RegionBuffer<T>>>,
    /// Cancels the close-out wait of the current tail.
    close_out: CancellationToken,
}

impl<T> RegionTask<T> {
    fn new() -> Self {
        Self {
            tail: None,
            buffer: Arc::new(Mutex::new(RegionBuffer::new())),
            close_out: CancellationToken::new(),
        }
    }
}

struct Shared<T> {
    files: RegionFiles,
    regions: Mutex<HashMap<RegionKey, RegionTask<T>>>,
    flush_delay: Duration,
    /// Closed from the start: spawning still works, and `wait` resolves
    /// whenever no step is running.
    tracker: TaskTracker,
    /// Once cancelled, close-outs no longer wait for the flush delay.
    shutdown: CancellationToken,
    stats: RegionStats,
}

/// Serializes all region file access for one metadata kind.
pub struct RegionScheduler<T> {
    shared: Arc<Shared<T>>,
}

impl<T: MetadataValue> RegionScheduler<T> {
    pub fn new(files: RegionFiles, flush_delay: Duration) -> Self {
        let tracker = TaskTracker::new();
        tracker.close();
        Self {
            shared: Arc::new(Shared {
                files,
                regions: Mutex::new(HashMap::new()),
                flush_delay,
                tracker,
                shutdown: CancellationToken::new(),
                stats: RegionStats::new(),
            }),
        }
    }

    pub fn files(&self) -> &RegionFiles {
        &self.shared.files
    }

    /// Run `op` against the buffered region once every operation scheduled
    /// before it for the same region has finished.
    ///
    /// The returned future resolves with the operation's result as soon as it
    /// has run; the write to disk happens later, on close-out. The operation
    /// runs even if the future is dropped. Must be called inside a tokio
    /// runtime.
    pub fn schedule<R, F>(&self, region: RegionKey, op: F) -> BoxFuture<'static, Result<R, StoreError>>
    where
        F: FnOnce(&mut RegionBuffer<T>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let mut regions = self.shared.regions.lock().expect("region table poisoned");
        let task = regions.entry(region.clone()).or_insert_with(|| {
            self.shared.stats.session_opened();
            tracing::debug!("Region session opened: {}", region);
            RegionTask::new()
        });

        // New work supersedes the pending close-out; the chain continues.
        task.close_out.cancel();
        task.close_out = CancellationToken::new();

        let step = Step {
            shared: Arc::clone(&self.shared),
            region: region.clone(),
            buffer: Arc::clone(&task.buffer),
            close_out: task.close_out.clone(),
        };
        let previous = task.tail.take();
        task.tail = Some(self.shared.tracker.spawn(step.run(previous, op, tx)));
        drop(regions);

        async move { rx.await.map_err(|_| StoreError::Interrupted(region)) }.boxed()
    }

    /// Wait until every scheduled operation and close-out has finished.
    /// Any number of callers may wait at once.
    pub async fn wait_idle(&self) {
        self.shared.tracker.wait().await;
    }

    /// Stop debouncing: pending and future close-outs write immediately.
    /// Resolves once every region has been written and closed.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        self.wait_idle().await;
    }

    /// Number of regions with an open session.
    pub fn active_regions(&self) -> usize {
        self.shared.regions.lock().expect("region table poisoned").len()
    }

    pub fn is_region_active(&self, region: &RegionKey) -> bool {
        self.shared
            .regions
            .lock()
            .expect("region table poisoned")
            .contains_key(region)
    }

    pub fn stats(&self) -> RegionStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

/// One link of a region chain.
struct Step<T> {
    shared: Arc<Shared<T>>,
    region: RegionKey,
    buffer: Arc<Mutex<RegionBuffer<T>>>,
    close_out: CancellationToken,
}

impl<T: MetadataValue> Step<T> {
    async fn run<R, F>(self, previous: Option<JoinHandle<()>>, op: F, tx: oneshot::Sender<R>)
    where
        F: FnOnce(&mut RegionBuffer<T>) -> R + Send + 'static,
        R: Send + 'static,
    {
        if let Some(previous) = previous {
            if let Err(e) = previous.await {
                tracing::error!("Previous task for region {} failed: {}", self.region, e);
            }
        }

        self.populate().await;
        let result = {
            let mut buffer = self.buffer.lock().expect("region buffer poisoned");
            op(&mut buffer)
        };
        self.shared.stats.operation_run();
        // The caller may have stopped listening; the operation still happened.
        let _ = tx.send(result);

        tokio::select! {
            biased;
            _ = self.close_out.cancelled() => return,
            _ = self.shared.shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.shared.flush_delay) => {}
        }
        self.close().await;
    }

    /// Read the region file into the buffer on the first step of a session.
    /// Unreadable regions are treated as empty.
    async fn populate(&self) {
        if self.buffer.lock().expect("region buffer poisoned").buffered {
            return;
        }

        let files = self.shared.files.clone();
        let region = self.region.clone();
        let read = tokio::task::spawn_blocking(move || files.read::<T>(&region)).await;
        let data = match read {
            Ok(Ok(data)) => {
                self.shared.stats.region_read(true);
                data.unwrap_or_default()
            }
            Ok(Err(e)) => {
                self.shared.stats.region_read(false);
                tracing::error!("Region {} unreadable, treating it as empty: {:#}", self.region, e);
                RegionData::new()
            }
            Err(e) => {
                self.shared.stats.region_read(false);
                tracing::error!("Region {} read task failed, treating it as empty: {}", self.region, e);
                RegionData::new()
            }
        };

        let mut buffer = self.buffer.lock().expect("region buffer poisoned");
        buffer.data = data;
        buffer.buffered = true;
    }

    /// Write the buffer if dirty, then end the session unless new work
    /// arrived meanwhile. After a failed write the session stays open.
    async fn close(self) {
        while !self.write_if_dirty().await {
            if self.shared.shutdown.is_cancelled() {
                tracing::error!("Region {} left unwritten at shutdown", self.region);
                return;
            }
            tokio::select! {
                biased;
                _ = self.close_out.cancelled() => return,
                _ = self.shared.shutdown.cancelled() => {}
                _ = tokio::time::sleep(self.shared.flush_delay) => {}
            }
        }

        let mut regions = self.shared.regions.lock().expect("region table poisoned");
        if self.close_out.is_cancelled() {
            // Work arrived while writing; the next step owns the session now.
            return;
        }
        regions.remove(&self.region);
        tracing::debug!("Region session closed: {}", self.region);
    }

    /// Returns whether the buffer is clean afterwards.
    async fn write_if_dirty(&self) -> bool {
        let snapshot = {
            let buffer = self.buffer.lock().expect("region buffer poisoned");
            buffer.dirty.then(|| buffer.data.clone())
        };
        let Some(data) = snapshot else {
            return true;
        };

        let files = self.shared.files.clone();
        let region = self.region.clone();
        let written = tokio::task::spawn_blocking(move || files.write(&region, &data)).await;
        match written {
            Ok(Ok(())) => {
                self.shared.stats.region_written(true);
                self.buffer.lock().expect("region buffer poisoned").dirty = false;
                tracing::debug!("Region {} written", self.region);
                true
            }
            Ok(Err(e)) => {
                self.shared.stats.region_written(false);
                tracing::error!("Failed to write region {}, keeping it buffered: {:#}", self.region, e);
                false
            }
            Err(e) => {
                self.shared.stats.region_written(false);
                tracing::error!("Write task for region {} failed, keeping it buffered: {}", self.region, e);
                false
            }
        }
    }
}
