use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use futures::future::{self, BoxFuture, FutureExt};

use crate::error::StoreError;
use crate::region::file::{ChunkMetadata, RegionFiles};
use crate::region::scheduler::{MetadataValue, RegionScheduler};
use crate::region::stats::RegionStatsSnapshot;
use crate::world::position::{BlockKey, ChunkKey};

/// In-memory side of a store, shared with the region tasks that publish
/// load and persist results into it.
struct StoreState<T> {
    /// Values of loaded chunks. Chunks without values have no entry.
    chunks: DashMap<ChunkKey, ChunkMetadata<T>>,
    /// Chunks whose metadata is resident, with or without values.
    loaded: DashSet<ChunkKey>,
    /// Chunks with a load or persist in flight.
    busy: DashSet<ChunkKey>,
    /// Chunks modified since they were last loaded or persisted.
    dirty: DashSet<ChunkKey>,
}

impl<T: MetadataValue> StoreState<T> {
    fn check_ready(&self, chunk: &ChunkKey) -> Result<(), StoreError> {
        if self.busy.contains(chunk) {
            return Err(StoreError::ChunkBusy(chunk.clone()));
        }
        if !self.loaded.contains(chunk) {
            return Err(StoreError::ChunkNotLoaded(chunk.clone()));
        }
        Ok(())
    }

    fn resident(&self, chunk: &ChunkKey) -> Option<ChunkMetadata<T>> {
        self.chunks.get(chunk).map(|values| values.value().clone())
    }
}

/// Chunk-partitioned per-block metadata of one kind, persisted to region
/// files.
///
/// Point and bulk accessors work synchronously on the in-memory maps of
/// loaded chunks; only loading and persisting go through the
/// [`RegionScheduler`]. While a chunk is loading or persisting every accessor
/// fails fast with [`StoreError::ChunkBusy`] instead of observing a partial
/// state.
pub struct MetadataStore<T> {
    name: String,
    state: Arc<StoreState<T>>,
    scheduler: RegionScheduler<T>,
}

impl<T: MetadataValue> MetadataStore<T> {
    /// A store named `name` keeping its region files under `root`.
    pub fn new(name: impl Into<String>, root: impl Into<std::path::PathBuf>, flush_delay: Duration) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(StoreState {
                chunks: DashMap::new(),
                loaded: DashSet::new(),
                busy: DashSet::new(),
                dirty: DashSet::new(),
            }),
            scheduler: RegionScheduler::new(RegionFiles::new(root), flush_delay),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Load / persist ──────────────────────────────────────────────────────

    /// Bring the chunk's metadata into memory.
    ///
    /// The chunk is busy from this call until the returned future resolves.
    /// The load completes even if the future is dropped.
    pub fn load_chunk(&self, chunk: ChunkKey) -> BoxFuture<'static, Result<(), StoreError>> {
        let state = &self.state;
        if state.loaded.contains(&chunk) || state.busy.contains(&chunk) {
            return future::ready(Err(StoreError::ChunkAlreadyLoaded(chunk))).boxed();
        }
        state.busy.insert(chunk.clone());

        let state = Arc::clone(&self.state);
        self.scheduler.schedule(chunk.region(), move |buffer| {
            if let Some(values) = buffer.section(chunk.pos).filter(|values| !values.is_empty()) {
                state.chunks.insert(chunk.clone(), values.clone());
            }
            state.loaded.insert(chunk.clone());
            state.dirty.remove(&chunk);
            state.busy.remove(&chunk);
        })
    }

    /// Write the chunk's metadata into its region, optionally evicting it
    /// from memory afterwards.
    ///
    /// A chunk with no changes since it was loaded leaves the region alone.
    pub fn persist_chunk(&self, chunk: ChunkKey, unload: bool) -> BoxFuture<'static, Result<(), StoreError>> {
        if let Err(e) = self.state.check_ready(&chunk) {
            return future::ready(Err(e)).boxed();
        }

        if !self.state.dirty.contains(&chunk) {
            if unload {
                self.evict(&chunk);
            }
            return future::ready(Ok(())).boxed();
        }

        self.state.busy.insert(chunk.clone());
        // Nothing mutates a busy chunk, so this copy is what gets written.
        let snapshot = self.state.resident(&chunk);
        self.state.dirty.remove(&chunk);

        let state = Arc::clone(&self.state);
        self.scheduler.schedule(chunk.region(), move |buffer| {
            buffer.replace_section(chunk.pos, snapshot);
            if unload {
                state.chunks.remove(&chunk);
                state.loaded.remove(&chunk);
            }
            state.busy.remove(&chunk);
        })
    }

    /// Load several chunks concurrently. Chunks that are already loaded or
    /// busy are skipped.
    pub fn load_chunks(&self, chunks: impl IntoIterator<Item = ChunkKey>) -> BoxFuture<'static, Result<(), StoreError>> {
        let loads: Vec<_> = chunks
            .into_iter()
            .filter(|chunk| !self.state.loaded.contains(chunk) && !self.state.busy.contains(chunk))
            .map(|chunk| self.load_chunk(chunk))
            .collect();
        async move {
            future::try_join_all(loads).await?;
            Ok(())
        }
        .boxed()
    }

    /// Persist several chunks concurrently. Chunks that are not loaded or are
    /// busy are skipped.
    pub fn persist_chunks(
        &self,
        chunks: impl IntoIterator<Item = ChunkKey>,
        unload: bool,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        let persists: Vec<_> = chunks
            .into_iter()
            .filter(|chunk| self.state.check_ready(chunk).is_ok())
            .map(|chunk| self.persist_chunk(chunk, unload))
            .collect();
        async move {
            future::try_join_all(persists).await?;
            Ok(())
        }
        .boxed()
    }

    fn evict(&self, chunk: &ChunkKey) {
        self.state.chunks.remove(chunk);
        self.state.loaded.remove(chunk);
    }

    // ── Point access ────────────────────────────────────────────────────────

    pub fn get_metadata(&self, block: &BlockKey) -> Result<Option<T>, StoreError> {
        let chunk = block.chunk();
        self.state.check_ready(&chunk)?;
        Ok(self
            .state
            .chunks
            .get(&chunk)
            .and_then(|values| values.get(&block.local()).cloned()))
    }

    /// Store `value` for the block, returning the previous value.
    pub fn set_metadata(&self, block: &BlockKey, value: T) -> Result<Option<T>, StoreError> {
        let chunk = block.chunk();
        self.state.check_ready(&chunk)?;
        let previous = self
            .state
            .chunks
            .entry(chunk.clone())
            .or_default()
            .insert(block.local(), value);
        self.state.dirty.insert(chunk);
        Ok(previous)
    }

    /// Remove the block's value, returning it.
    pub fn remove_metadata(&self, block: &BlockKey) -> Result<Option<T>, StoreError> {
        let chunk = block.chunk();
        self.state.check_ready(&chunk)?;
        let removed = self
            .state
            .chunks
            .get_mut(&chunk)
            .and_then(|mut values| values.remove(&block.local()));
        if removed.is_some() {
            self.state.chunks.remove_if(&chunk, |_, values| values.is_empty());
            self.state.dirty.insert(chunk);
        }
        Ok(removed)
    }

    // ── Chunk access ────────────────────────────────────────────────────────

    /// Copy of all values stored in a loaded chunk, `None` if it has none.
    pub fn get_metadata_in_chunk(&self, chunk: &ChunkKey) -> Result<Option<ChunkMetadata<T>>, StoreError> {
        self.state.check_ready(chunk)?;
        Ok(self.state.resident(chunk))
    }

    /// Remove and return all values stored in a loaded chunk.
    pub fn remove_metadata_for_chunk(&self, chunk: &ChunkKey) -> Result<Option<ChunkMetadata<T>>, StoreError> {
        self.state.check_ready(chunk)?;
        let removed = self.state.chunks.remove(chunk).map(|(_, values)| values);
        if removed.is_some() {
            self.state.dirty.insert(chunk.clone());
        }
        Ok(removed)
    }

    pub fn has_metadata_for_chunk(&self, chunk: &ChunkKey) -> Result<bool, StoreError> {
        self.state.check_ready(chunk)?;
        Ok(self.state.chunks.contains_key(chunk))
    }

    /// Mutate a loaded chunk's values in place. An empty map afterwards
    /// removes the chunk's entry.
    pub fn modify_chunk<R>(
        &self,
        chunk: &ChunkKey,
        f: impl FnOnce(&mut ChunkMetadata<T>) -> R,
    ) -> Result<R, StoreError> {
        self.state.check_ready(chunk)?;
        let mut values = self.state.chunks.remove(chunk).map(|(_, values)| values).unwrap_or_default();
        let result = f(&mut values);
        if !values.is_empty() {
            self.state.chunks.insert(chunk.clone(), values);
        }
        self.state.dirty.insert(chunk.clone());
        Ok(result)
    }

    /// Values stored for a chunk whether or not it is loaded.
    ///
    /// Resident chunks answer from memory. Anything else is read through the
    /// region chain, after any load or persist already queued for it, without
    /// making the chunk resident.
    pub fn fetch_chunk(&self, chunk: ChunkKey) -> BoxFuture<'static, Result<Option<ChunkMetadata<T>>, StoreError>> {
        if self.state.check_ready(&chunk).is_ok() {
            return future::ready(Ok(self.state.resident(&chunk))).boxed();
        }

        let state = Arc::clone(&self.state);
        self.scheduler.schedule(chunk.region(), move |buffer| {
            if state.loaded.contains(&chunk) {
                state.resident(&chunk)
            } else {
                buffer.section(chunk.pos).filter(|values| !values.is_empty()).cloned()
            }
        })
    }

    // ── State ───────────────────────────────────────────────────────────────

    pub fn is_chunk_busy(&self, chunk: &ChunkKey) -> bool {
        self.state.busy.contains(chunk)
    }

    pub fn is_chunk_loaded(&self, chunk: &ChunkKey) -> bool {
        self.state.loaded.contains(chunk)
    }

    pub fn is_chunk_dirty(&self, chunk: &ChunkKey) -> bool {
        self.state.dirty.contains(chunk)
    }

    pub fn loaded_chunks(&self) -> Vec<ChunkKey> {
        self.state.loaded.iter().map(|chunk| chunk.key().clone()).collect()
    }

    // ── Scheduler passthrough ───────────────────────────────────────────────

    /// Wait until every queued load, persist and region write has finished.
    pub async fn wait_idle(&self) {
        self.scheduler.wait_idle().await;
    }

    /// Flush every open region immediately and wait for it.
    pub async fn shutdown(&self) {
        tracing::info!("Flushing {} metadata regions", self.name);
        self.scheduler.shutdown().await;
    }

    pub fn region_stats(&self) -> RegionStatsSnapshot {
        self.scheduler.stats()
    }

    pub fn region_files(&self) -> &RegionFiles {
        self.scheduler.files()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::position::{BlockPos, ChunkPos, WorldId};

    fn store(dir: &std::path::Path) -> MetadataStore<f64> {
        MetadataStore::new("durability", dir, Duration::from_millis(20))
    }

    fn chunk(x: i32, z: i32) -> ChunkKey {
        ChunkKey::new(WorldId::new("world"), ChunkPos::new(x, z))
    }

    fn block(x: i64, y: i64, z: i64) -> BlockKey {
        BlockKey::new(WorldId::new("world"), BlockPos::new(x, y, z))
    }

    #[tokio::test]
    async fn unloaded_chunk_rejects_access() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(
            store.get_metadata(&block(1, 2, 3)),
            Err(StoreError::ChunkNotLoaded(chunk(0, 0)))
        );
        assert!(matches!(
            store.persist_chunk(chunk(0, 0), true).await,
            Err(StoreError::ChunkNotLoaded(_))
        ));
    }

    #[tokio::test]
    async fn loaded_empty_chunk_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.load_chunk(chunk(0, 0)).await.unwrap();

        assert_eq!(store.get_metadata(&block(1, 2, 3)), Ok(None));
        assert_eq!(store.has_metadata_for_chunk(&chunk(0, 0)), Ok(false));
        assert_eq!(store.get_metadata_in_chunk(&chunk(0, 0)), Ok(None));
        store.wait_idle().await;
    }

    #[tokio::test]
    async fn double_load_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let first = store.load_chunk(chunk(0, 0));
        assert_eq!(
            store.load_chunk(chunk(0, 0)).await,
            Err(StoreError::ChunkAlreadyLoaded(chunk(0, 0)))
        );
        first.await.unwrap();
        assert_eq!(
            store.load_chunk(chunk(0, 0)).await,
            Err(StoreError::ChunkAlreadyLoaded(chunk(0, 0)))
        );
        store.wait_idle().await;
    }

    #[tokio::test]
    async fn writes_are_visible_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.load_chunk(chunk(0, 0)).await.unwrap();

        assert_eq!(store.set_metadata(&block(1, 64, 1), 0.5), Ok(None));
        assert_eq!(store.get_metadata(&block(1, 64, 1)), Ok(Some(0.5)));
        assert_eq!(store.set_metadata(&block(1, 64, 1), 0.25), Ok(Some(0.5)));
        assert!(store.is_chunk_dirty(&chunk(0, 0)));

        assert_eq!(store.remove_metadata(&block(1, 64, 1)), Ok(Some(0.25)));
        assert_eq!(store.has_metadata_for_chunk(&chunk(0, 0)), Ok(false));
        store.wait_idle().await;
    }

    #[tokio::test]
    async fn modify_chunk_drops_emptied_maps() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.load_chunk(chunk(0, 0)).await.unwrap();
        store.set_metadata(&block(0, 0, 0), 0.1).unwrap();
        store.set_metadata(&block(0, 1, 0), 0.2).unwrap();

        let removed = store
            .modify_chunk(&chunk(0, 0), |values| {
                let n = values.len();
                values.clear();
                n
            })
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.has_metadata_for_chunk(&chunk(0, 0)), Ok(false));
        store.wait_idle().await;
    }

    #[tokio::test]
    async fn clean_chunk_unloads_without_io() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.load_chunk(chunk(0, 0)).await.unwrap();
        store.wait_idle().await;
        let before = store.region_stats();

        store.persist_chunk(chunk(0, 0), true).await.unwrap();
        assert!(!store.is_chunk_loaded(&chunk(0, 0)));
        store.wait_idle().await;
        assert_eq!(store.region_stats().operations, before.operations);
    }

    #[tokio::test]
    async fn fetch_reads_unloaded_chunks_without_loading_them() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.load_chunk(chunk(2, 2)).await.unwrap();
        store.set_metadata(&block(33, 5, 33), 0.75).unwrap();

        // Resident answer.
        let resident = store.fetch_chunk(chunk(2, 2)).await.unwrap().unwrap();
        assert_eq!(resident.len(), 1);

        store.persist_chunk(chunk(2, 2), true).await.unwrap();
        let fetched = store.fetch_chunk(chunk(2, 2)).await.unwrap().unwrap();
        assert_eq!(fetched.values().copied().collect::<Vec<_>>(), vec![0.75]);
        assert!(!store.is_chunk_loaded(&chunk(2, 2)));

        assert_eq!(store.fetch_chunk(chunk(-9, 4)).await, Ok(None));
        store.wait_idle().await;
    }
}
