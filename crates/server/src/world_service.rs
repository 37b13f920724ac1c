//! Per-world switches and bulk chunk metadata lifecycle for both stores.

use std::collections::HashSet;
use std::sync::Arc;

use softclaims_engine::{ChunkKey, MetadataStore, StoreError, WorldId};

use crate::faction::FactionId;

pub struct WorldService {
    disabled_worlds: HashSet<String>,
    durabilities: Arc<MetadataStore<f64>>,
    cores: Arc<MetadataStore<FactionId>>,
}

impl WorldService {
    pub fn new(
        disabled_worlds: HashSet<String>,
        durabilities: Arc<MetadataStore<f64>>,
        cores: Arc<MetadataStore<FactionId>>,
    ) -> Self {
        Self {
            disabled_worlds,
            durabilities,
            cores,
        }
    }

    pub fn is_world_disabled(&self, world: &WorldId) -> bool {
        self.disabled_worlds.contains(world.as_str())
    }

    pub fn durability_store(&self) -> &Arc<MetadataStore<f64>> {
        &self.durabilities
    }

    pub fn core_store(&self) -> &Arc<MetadataStore<FactionId>> {
        &self.cores
    }

    fn enabled(&self, chunks: impl IntoIterator<Item = ChunkKey>) -> Vec<ChunkKey> {
        chunks
            .into_iter()
            .filter(|chunk| !self.is_world_disabled(&chunk.world))
            .collect()
    }

    /// Load both kinds of metadata for `chunks`, skipping disabled worlds and
    /// chunks that are already loaded.
    pub async fn load_metadata_for_chunks(
        &self,
        chunks: impl IntoIterator<Item = ChunkKey>,
    ) -> Result<(), StoreError> {
        let chunks = self.enabled(chunks);
        tracing::debug!("Loading metadata for {} chunks", chunks.len());
        let durabilities = self.durabilities.load_chunks(chunks.clone());
        let cores = self.cores.load_chunks(chunks);
        futures::try_join!(durabilities, cores)?;
        Ok(())
    }

    /// Persist both kinds of metadata for `chunks`, skipping disabled worlds
    /// and chunks that are not loaded.
    pub async fn save_metadata_for_chunks(
        &self,
        chunks: impl IntoIterator<Item = ChunkKey>,
        unload: bool,
    ) -> Result<(), StoreError> {
        let chunks = self.enabled(chunks);
        tracing::debug!("Saving metadata for {} chunks", chunks.len());
        let durabilities = self.durabilities.persist_chunks(chunks.clone(), unload);
        let cores = self.cores.persist_chunks(chunks, unload);
        futures::try_join!(durabilities, cores)?;
        Ok(())
    }

    /// Persist every loaded chunk of both stores and flush all regions.
    pub async fn shutdown(&self) {
        let loaded: HashSet<ChunkKey> = self
            .durabilities
            .loaded_chunks()
            .into_iter()
            .chain(self.cores.loaded_chunks())
            .collect();
        if let Err(e) = self.save_metadata_for_chunks(loaded, true).await {
            tracing::error!("Failed to save metadata on shutdown: {}", e);
        }
        tokio::join!(self.durabilities.shutdown(), self.cores.shutdown());
    }
}
